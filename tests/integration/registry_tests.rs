//! Integration tests for RegTAP registry search using mocked HTTP responses

use tracing_test::traced_test;
use vo_client::registry::{RegistryQuery, ServiceType};
use vo_client::{ClientConfig, RegistryClient, VoError};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_client(mock_server: &MockServer) -> RegistryClient {
    let config = ClientConfig::new()
        .with_base_url(mock_server.uri())
        .with_rate_limit(100.0); // High rate limit for tests
    RegistryClient::with_config(config)
}

fn votable_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "application/x-votable+xml")
}

// Two capabilities plus one row without an ivoid, which the mapping skips.
const REGISTRY_RESULT: &str = r#"<VOTABLE><RESOURCE type="results">
<INFO name="QUERY_STATUS" value="OK"/>
<TABLE>
<FIELD name="ivoid" datatype="char" arraysize="*"/>
<FIELD name="res_title" datatype="char" arraysize="*"/>
<FIELD name="short_name" datatype="char" arraysize="*"/>
<FIELD name="res_description" datatype="char" arraysize="*"/>
<FIELD name="standard_id" datatype="char" arraysize="*"/>
<FIELD name="access_url" datatype="char" arraysize="*"/>
<DATA><TABLEDATA>
<TR><TD>ivo://org.gavo.dc/tap</TD><TD>GAVO Data Center TAP service</TD><TD>GAVO TAP</TD><TD>TAP access to all tables at the GAVO data centre</TD><TD>ivo://ivoa.net/std/tap</TD><TD>http://dc.g-vo.org/tap</TD></TR>
<TR><TD>ivo://cds.vizier/ii/246</TD><TD>2MASS All-Sky Catalog of Point Sources</TD><TD>II/246</TD><TD>Positions and photometry from the Two Micron All Sky Survey</TD><TD>ivo://ivoa.net/std/conesearch</TD><TD>http://vizier.example.org/viz-bin/conesearch?-source=II/246</TD></TR>
<TR><TD/><TD>Capability row without an identifier</TD><TD/><TD/><TD/><TD/></TR>
</TABLEDATA></DATA>
</TABLE>
</RESOURCE></VOTABLE>"#;

// ================================================================================================
// Query construction
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_search_sends_regtap_query_and_maps_hits() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("FROM+rr.resource+AS+res"))
        .and(body_string_contains("NATURAL+JOIN+rr.capability"))
        .and(body_string_contains("intf.intf_role+%3D+%27std%27"))
        .and(body_string_contains("%27%25pulsar%25%27"))
        .and(body_string_contains("ivo_hasword"))
        .respond_with(votable_response(REGISTRY_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = create_test_client(&mock_server);
    let hits = registry
        .search(&["pulsar"])
        .await
        .expect("Registry search should succeed");

    assert_eq!(hits.len(), 2, "Row without an ivoid should be dropped");
    assert_eq!(hits[0].ivoid, "ivo://org.gavo.dc/tap");
    assert_eq!(
        hits[0].title.as_deref(),
        Some("GAVO Data Center TAP service")
    );
    assert_eq!(hits[0].short_name.as_deref(), Some("GAVO TAP"));
    assert_eq!(hits[0].access_url.as_deref(), Some("http://dc.g-vo.org/tap"));
    assert!(hits[0].is_tap());

    assert_eq!(hits[1].ivoid, "ivo://cds.vizier/ii/246");
    assert!(!hits[1].is_tap());
}

#[tokio::test]
#[traced_test]
async fn test_every_keyword_must_match() {
    let mock_server = MockServer::start().await;

    // Two keywords arrive as two AND-ed condition groups.
    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("%27%25pulsar%25%27"))
        .and(body_string_contains("%27%25timing%25%27"))
        .and(body_string_contains("+AND+"))
        .respond_with(votable_response(REGISTRY_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = create_test_client(&mock_server);
    registry
        .search(&["pulsar", "timing"])
        .await
        .expect("Two-keyword search should succeed");
}

#[tokio::test]
#[traced_test]
async fn test_service_type_narrows_on_standard_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("cap.standard_id"))
        .and(body_string_contains("std%2Ftap%25"))
        .respond_with(votable_response(REGISTRY_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = create_test_client(&mock_server);
    let query = RegistryQuery::new().service_type(ServiceType::Tap);
    let hits = registry
        .search_with(&query)
        .await
        .expect("Service type search should succeed");
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
#[traced_test]
async fn test_waveband_constraint_is_lowercased() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_string_contains("ivo_hashlist_has"))
        .and(body_string_contains("%27infrared%27"))
        .respond_with(votable_response(REGISTRY_RESULT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = create_test_client(&mock_server);
    let query = RegistryQuery::new().keyword("2MASS").waveband("Infrared");
    registry
        .search_with(&query)
        .await
        .expect("Waveband search should succeed");
}

#[tokio::test]
#[traced_test]
async fn test_search_without_constraints_fails_before_http() {
    let mock_server = MockServer::start().await;
    let registry = create_test_client(&mock_server);

    let err = registry
        .search(&[])
        .await
        .expect_err("Unconstrained search should be rejected");
    assert!(matches!(err, VoError::InvalidQuery(_)));

    let received_requests = mock_server.received_requests().await.unwrap();
    assert_eq!(received_requests.len(), 0);
}

// ================================================================================================
// Handing a hit off to a TAP client
// ================================================================================================

#[tokio::test]
#[traced_test]
async fn test_tap_hit_becomes_a_tap_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(votable_response(REGISTRY_RESULT))
        .mount(&mock_server)
        .await;

    let registry = create_test_client(&mock_server);
    let hits = registry.search(&["gavo"]).await.unwrap();

    let tap = hits[0]
        .tap_client(ClientConfig::new())
        .expect("TAP capability should yield a client");
    assert_eq!(tap.base_url(), "http://dc.g-vo.org/tap");
}

#[tokio::test]
#[traced_test]
async fn test_non_tap_hit_refuses_tap_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(votable_response(REGISTRY_RESULT))
        .mount(&mock_server)
        .await;

    let registry = create_test_client(&mock_server);
    let hits = registry.search(&["2MASS"]).await.unwrap();

    let err = hits[1]
        .tap_client(ClientConfig::new())
        .expect_err("Cone search capability is not a TAP service");
    match err {
        VoError::NotFound { what } => assert!(what.contains("ivo://cds.vizier/ii/246")),
        other => panic!("Expected NotFound, got {other:?}"),
    }
}
