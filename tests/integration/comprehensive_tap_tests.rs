//! Integration tests for synchronous TAP queries using mocked HTTP responses
//!
//! These tests verify the `/sync` endpoint handling without talking to a real
//! archive. They use wiremock to simulate TAP service responses.

use tracing_test::traced_test;
use vo_client::{ClientConfig, ResultFormat, TapClient, Value, VoError};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a client pointing at a mock server
fn create_test_client(mock_server: &MockServer) -> TapClient {
    let config = ClientConfig::new()
        .with_base_url(mock_server.uri())
        .with_rate_limit(100.0); // High rate limit for tests
    TapClient::with_config(&mock_server.uri(), config)
}

/// Gaia-flavored VOTable result with two rows
const SYNC_RESULT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE xmlns="http://www.ivoa.net/xml/VOTable/v1.3" version="1.3">
<RESOURCE type="results">
<INFO name="QUERY_STATUS" value="OK"/>
<TABLE>
<FIELD name="source_id" datatype="long"/>
<FIELD name="ra" datatype="double" unit="deg"/>
<FIELD name="dec" datatype="double" unit="deg"/>
<FIELD name="phot_g_mean_mag" datatype="float"/>
<DATA>
<TABLEDATA>
<TR><TD>4472832130942575872</TD><TD>266.41683</TD><TD>-29.00781</TD><TD>17.87</TD></TR>
<TR><TD>4472832130942589952</TD><TD>266.41731</TD><TD>-29.00847</TD><TD/></TR>
</TABLEDATA>
</DATA>
</TABLE>
</RESOURCE>
</VOTABLE>"#;

fn votable_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "application/x-votable+xml")
}

// ================================================================================================
// Successful queries
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_sync_query_parses_votable_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(votable_response(SYNC_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let table = client
        .query("SELECT TOP 5 * FROM gaiadr3.gaia_source")
        .await
        .expect("Sync query should succeed");

    assert_eq!(table.ncols(), 4);
    assert_eq!(table.nrows(), 2);
    assert!(!table.truncated);
    assert_eq!(
        table.cell(0, "source_id"),
        Some(&Value::Long(4472832130942575872))
    );
    assert_eq!(table.cell(0, "ra"), Some(&Value::Double(266.41683)));
    assert_eq!(table.column("ra").unwrap().unit.as_deref(), Some("deg"));
    // Empty TD comes through as a null cell
    assert_eq!(table.cell(1, "phot_g_mean_mag"), Some(&Value::Null));
}

#[tokio::test]
#[traced_test]
async fn test_sync_query_sends_tap_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("REQUEST=doQuery"))
        .and(body_string_contains("LANG=ADQL"))
        .and(body_string_contains("FORMAT=votable"))
        .and(body_string_contains(
            "QUERY=SELECT+TOP+5+*+FROM+gaiadr3.gaia_source",
        ))
        .respond_with(votable_response(SYNC_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    client
        .query("SELECT TOP 5 * FROM gaiadr3.gaia_source")
        .await
        .expect("Query with matching form parameters should succeed");
}

#[tokio::test]
#[traced_test]
async fn test_sync_query_json_format() {
    let mock_server = MockServer::start().await;

    let json_body = r#"{
        "metadata": [
            {"name": "source_id", "datatype": "long"},
            {"name": "ra", "datatype": "double", "unit": "deg"},
            {"name": "designation", "datatype": "char", "arraysize": "*"}
        ],
        "data": [
            [4295806720, 44.99615537, "Gaia DR3 4295806720"],
            [38655544960, 45.00432028, null]
        ]
    }"#;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("FORMAT=json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(json_body)
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let table = client
        .query_with_format("SELECT TOP 2 * FROM gaiadr3.gaia_source", ResultFormat::Json)
        .await
        .expect("JSON query should succeed");

    assert_eq!(table.ncols(), 3);
    assert_eq!(table.nrows(), 2);
    assert_eq!(table.cell(0, "source_id"), Some(&Value::Long(4295806720)));
    assert_eq!(table.cell(0, "ra"), Some(&Value::Double(44.99615537)));
    assert_eq!(
        table.cell(0, "designation"),
        Some(&Value::Str("Gaia DR3 4295806720".to_string()))
    );
    assert_eq!(table.cell(1, "designation"), Some(&Value::Null));
}

#[tokio::test]
#[traced_test]
async fn test_sync_query_empty_result() {
    let mock_server = MockServer::start().await;

    let empty = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="OK"/>
<TABLE>
<FIELD name="source_id" datatype="long"/>
<DATA><TABLEDATA/></DATA>
</TABLE>
</RESOURCE></VOTABLE>"#;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(votable_response(empty))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let table = client
        .query("SELECT * FROM gaiadr3.gaia_source WHERE source_id = -1")
        .await
        .expect("Empty result should still parse");

    assert!(table.is_empty());
    assert_eq!(table.ncols(), 1);
}

#[tokio::test]
#[traced_test]
async fn test_sync_query_overflow_sets_truncated() {
    let mock_server = MockServer::start().await;

    let overflowed = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="OK"/>
<TABLE>
<FIELD name="ra" datatype="double"/>
<DATA><TABLEDATA><TR><TD>1.5</TD></TR></TABLEDATA></DATA>
</TABLE>
<INFO name="QUERY_STATUS" value="OVERFLOW"/>
</RESOURCE></VOTABLE>"#;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(votable_response(overflowed))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let table = client
        .query("SELECT ra FROM gaiadr3.gaia_source")
        .await
        .expect("Overflowed result should parse");

    assert!(table.truncated, "OVERFLOW status should mark the table");
    assert_eq!(table.nrows(), 1);
}

// ================================================================================================
// Error responses
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_sync_query_error_status_fails() {
    let mock_server = MockServer::start().await;

    let error_doc = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="ERROR">
1 unresolved identifiers: paralax [l.1 c.12]
</INFO>
</RESOURCE></VOTABLE>"#;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(votable_response(error_doc))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let err = client
        .query("SELECT paralax FROM gaiadr3.gaia_source")
        .await
        .expect_err("ERROR status should fail the query");

    match err {
        VoError::ServiceError { message } => {
            assert!(message.contains("unresolved identifiers"));
        }
        other => panic!("expected ServiceError, got {other:?}"),
    }
}

#[tokio::test]
#[traced_test]
async fn test_http_error_with_votable_body_surfaces_message() {
    let mock_server = MockServer::start().await;

    // Some services answer bad ADQL with HTTP 400 plus a VOTable error body
    let error_doc = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="ERROR">Cannot parse query: syntax error near "SELCT"</INFO>
</RESOURCE></VOTABLE>"#;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(error_doc)
                .insert_header("content-type", "application/x-votable+xml"),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let err = client
        .query("SELCT * FROM gaiadr3.gaia_source")
        .await
        .expect_err("400 response should fail the query");

    match err {
        VoError::ServiceError { message } => assert!(message.contains("syntax error")),
        other => panic!("expected ServiceError, got {other:?}"),
    }
}

#[tokio::test]
#[traced_test]
async fn test_http_error_plain_body_maps_to_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let err = client
        .query("SELECT 1")
        .await
        .expect_err("400 response should fail the query");

    match err {
        VoError::StatusError { status, .. } => assert_eq!(status, 400),
        other => panic!("expected StatusError, got {other:?}"),
    }
}

#[tokio::test]
#[traced_test]
async fn test_binary_serialization_is_rejected() {
    let mock_server = MockServer::start().await;

    let binary = r#"<VOTABLE><RESOURCE><TABLE>
<FIELD name="ra" datatype="double"/>
<DATA><BINARY2><STREAM encoding="base64">AAECAw==</STREAM></BINARY2></DATA>
</TABLE></RESOURCE></VOTABLE>"#;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(votable_response(binary))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let err = client
        .query("SELECT ra FROM gaiadr3.gaia_source")
        .await
        .expect_err("BINARY2 response should be rejected");

    match err {
        VoError::VotableError(message) => assert!(message.contains("BINARY2")),
        other => panic!("expected VotableError, got {other:?}"),
    }
}
