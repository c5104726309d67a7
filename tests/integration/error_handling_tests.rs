//! Transport-level tests for retry behavior and HTTP error mapping

use std::time::Duration;

use rstest::rstest;
use tracing_test::traced_test;
use vo_client::{ClientConfig, RetryConfig, TapClient, VoError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMPTY_RESULT: &str = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="OK"/>
<TABLE>
<FIELD name="ra" datatype="double"/>
<DATA><TABLEDATA/></DATA>
</TABLE>
</RESOURCE></VOTABLE>"#;

const ERROR_RESULT: &str = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="ERROR">Column 'xyzzy' does not exist</INFO>
</RESOURCE></VOTABLE>"#;

fn fast_retries(max_retries: usize) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

fn create_test_client(mock_server: &MockServer, retry: RetryConfig) -> TapClient {
    let config = ClientConfig::new()
        .with_rate_limit(100.0) // High rate limit for tests
        .with_retry_config(retry);
    TapClient::with_config(&mock_server.uri(), config)
}

// ================================================================================================
// Retry behavior
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_transient_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    // First attempt hits a 503, the retry lands on the healthy mock
    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_RESULT))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server, fast_retries(2));
    let table = client
        .query("SELECT ra FROM ivoa.obscore")
        .await
        .expect("Retry should recover from a transient 503");
    assert!(table.is_empty());

    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 2);
}

#[tokio::test]
#[traced_test]
async fn test_retries_exhausted_surfaces_last_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server, fast_retries(2));
    let err = client
        .query("SELECT ra FROM ivoa.obscore")
        .await
        .expect_err("Persistent 500 should fail");
    match err {
        VoError::StatusError { status, .. } => assert_eq!(status, 500),
        other => panic!("Expected StatusError, got {other:?}"),
    }

    // initial attempt plus two retries
    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 3);
}

#[tokio::test]
#[traced_test]
async fn test_request_timeout_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(EMPTY_RESULT)
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&mock_server)
        .await;

    let config = ClientConfig::new()
        .with_rate_limit(100.0) // High rate limit for tests
        .with_timeout(Duration::from_millis(50))
        .with_retry_config(fast_retries(1));
    let client = TapClient::with_config(&mock_server.uri(), config);

    let err = client
        .query("SELECT ra FROM ivoa.obscore")
        .await
        .expect_err("Response slower than the timeout should fail");
    assert!(matches!(err, VoError::RequestError(_)));

    // initial attempt plus one retry, both received before the delay elapses
    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 2);
}

#[rstest]
#[case::internal_error(500)]
#[case::bad_gateway(502)]
#[case::service_unavailable(503)]
#[case::too_many_requests(429)]
#[tokio::test]
async fn test_retryable_status_maps_to_status_error(#[case] status: u16) {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server, RetryConfig::no_retries());
    let err = client
        .query("SELECT ra FROM ivoa.obscore")
        .await
        .expect_err("Error status should map to an error");
    match err {
        VoError::StatusError { status: got, url } => {
            assert_eq!(got, status);
            assert!(url.contains("/sync"));
        }
        other => panic!("Expected StatusError, got {other:?}"),
    }

    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 1);
}

// ================================================================================================
// Failures where a retry cannot help
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(400).set_body_string("MALFORMED QUERY"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server, fast_retries(3));
    let err = client
        .query("SELEKT ra FROM ivoa.obscore")
        .await
        .expect_err("400 should fail");
    assert!(matches!(err, VoError::StatusError { status: 400, .. }));

    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 1);
}

#[tokio::test]
#[traced_test]
async fn test_service_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    // 200 with an ERROR status in the VOTable body
    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ERROR_RESULT))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server, fast_retries(3));
    let err = client
        .query("SELECT xyzzy FROM ivoa.obscore")
        .await
        .expect_err("Service-reported error should fail");
    match err {
        VoError::ServiceError { message } => assert!(message.contains("xyzzy")),
        other => panic!("Expected ServiceError, got {other:?}"),
    }

    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 1);
}

#[rstest]
#[case::unauthorized(401)]
#[case::forbidden(403)]
#[tokio::test]
async fn test_auth_status_maps_to_auth_required(#[case] status: u16) {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server, fast_retries(3));
    let err = client
        .query("SELECT ra FROM ivoa.obscore")
        .await
        .expect_err("Auth status should fail");
    assert!(matches!(err, VoError::AuthRequired));

    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 1);
}
