//! Integration tests for the JWST archive client using mocked HTTP responses
//!
//! Covers the TAP query surface and the product download endpoint, including
//! filename selection from the Content-Disposition header.

use tracing_test::traced_test;
use vo_client::{ClientConfig, JwstClient, Value, VoError};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper pointing both the TAP endpoint and the data endpoint at the mock
fn create_test_client(mock_server: &MockServer) -> JwstClient {
    let config = ClientConfig::new()
        .with_base_url(mock_server.uri())
        .with_data_base_url(mock_server.uri())
        .with_rate_limit(100.0); // High rate limit for tests
    JwstClient::with_config(config)
}

const OBSERVATION_RESULT: &str = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="OK"/>
<TABLE>
<FIELD name="observationid" datatype="char" arraysize="*"/>
<FIELD name="target_name" datatype="char" arraysize="*"/>
<FIELD name="target_ra" datatype="double"/>
<FIELD name="target_dec" datatype="double"/>
<FIELD name="instrument_name" datatype="char" arraysize="*"/>
<DATA><TABLEDATA>
<TR><TD>jw02739-o001_t001_nircam</TD><TD>M-16</TD><TD>274.7009</TD><TD>-13.8070</TD><TD>NIRCAM</TD></TR>
</TABLEDATA></DATA>
</TABLE>
</RESOURCE></VOTABLE>"#;

fn votable_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "application/x-votable+xml")
}

// ================================================================================================
// TAP queries
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_query_target_matches_name_case_insensitively() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("FROM+jwst.main"))
        .and(body_string_contains("UPPER"))
        .and(body_string_contains("%25M-16%25"))
        .respond_with(votable_response(OBSERVATION_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let table = client
        .query_target("m-16")
        .await
        .expect("Target query should succeed");

    assert_eq!(table.nrows(), 1);
    assert_eq!(
        table.cell(0, "instrument_name"),
        Some(&Value::Str("NIRCAM".to_string()))
    );
}

#[tokio::test]
#[traced_test]
async fn test_cone_search_uses_target_columns() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("target_ra"))
        .and(body_string_contains("target_dec"))
        .and(body_string_contains("SELECT+TOP+50"))
        .respond_with(votable_response(OBSERVATION_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    client
        .cone_search(274.7009, -13.8070, 0.2)
        .await
        .expect("Cone search should succeed");
}

#[tokio::test]
#[traced_test]
async fn test_query_by_instrument() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("instrument_name"))
        .and(body_string_contains("%27NIRCAM%27"))
        .respond_with(votable_response(OBSERVATION_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    client
        .query_by_instrument("NIRCAM")
        .await
        .expect("Instrument query should succeed");
}

#[tokio::test]
#[traced_test]
async fn test_cone_search_rejects_invalid_coordinates() {
    let mock_server = MockServer::start().await;
    let client = create_test_client(&mock_server);

    let err = client
        .cone_search(400.0, 0.0, 0.2)
        .await
        .expect_err("RA out of range should fail");
    assert!(matches!(err, VoError::InvalidCoordinates { .. }));

    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 0);
}

// ================================================================================================
// Product downloads
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_get_product_uses_content_disposition_filename() {
    let mock_server = MockServer::start().await;

    let fits_bytes = b"SIMPLE  =                    T".to_vec();
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("RETRIEVAL_TYPE", "PRODUCT"))
        .and(query_param("ARTIFACTID", "8740-65d552a63acd"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(fits_bytes.clone())
                .insert_header(
                    "content-disposition",
                    r#"attachment;filename="jw02739001001_02105_00001_nrcb1_i2d.fits""#,
                ),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = create_test_client(&mock_server);
    let saved = client
        .get_product("8740-65d552a63acd", dir.path())
        .await
        .expect("Product download should succeed");

    assert_eq!(
        saved.file_name().unwrap(),
        "jw02739001001_02105_00001_nrcb1_i2d.fits"
    );
    assert_eq!(std::fs::read(&saved).unwrap(), fits_bytes);
}

#[tokio::test]
#[traced_test]
async fn test_get_product_falls_back_to_artifact_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("RETRIEVAL_TYPE", "PRODUCT"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = create_test_client(&mock_server);
    let saved = client
        .get_product("artifact123", dir.path())
        .await
        .expect("Download without Content-Disposition should succeed");

    assert_eq!(saved.file_name().unwrap(), "artifact123");
}

#[tokio::test]
#[traced_test]
async fn test_get_product_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such artifact"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = create_test_client(&mock_server);
    let err = client
        .get_product("missing", dir.path())
        .await
        .expect_err("Missing artifact should fail");

    assert!(matches!(err, VoError::StatusError { status: 404, .. }));
}
