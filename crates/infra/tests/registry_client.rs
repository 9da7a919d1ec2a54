//! Registry client tests against a mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use fleetsync_core::{CommandExecutor, TwinRegistry};
use fleetsync_domain::FleetError;
use fleetsync_infra::{RegistryClient, RegistryClientConfig};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> RegistryClient {
    let config = RegistryClientConfig {
        base_url: server.uri(),
        api_key: Some("test-key".into()),
        page_size: 2,
        ..RegistryClientConfig::default()
    };
    RegistryClient::new(config).expect("client built")
}

fn twin_json(device_id: &str, version: i64) -> serde_json::Value {
    json!({
        "deviceId": device_id,
        "tags": {"modelId": "m1"},
        "properties": {"desired": {}, "reported": {}},
        "version": version,
        "connectionState": "Connected",
        "status": "enabled"
    })
}

#[tokio::test]
async fn device_twins_request_carries_page_size_and_exclusion() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/devices/twins"))
        .and(query_param("pageSize", "2"))
        .and(query_param("excludeModelType", "LoRa Concentrator"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [twin_json("dev-1", 1)],
            "totalItems": 1,
            "nextPage": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server).get_device_twins(None).await.expect("page fetched");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total_items, 1);
    assert!(page.next_page.is_none());
}

#[tokio::test]
async fn continuation_token_is_forwarded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/devices/twins"))
        .and(query_param("continuationToken", "token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [twin_json("dev-3", 1)],
            "totalItems": 3,
            "nextPage": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server).get_device_twins(Some("token-2")).await.expect("page fetched");
    assert_eq!(page.items[0].device_id, "dev-3");
}

#[tokio::test]
async fn edge_twins_omit_model_exclusion() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/edge-devices/twins"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "totalItems": 0,
            "nextPage": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server).get_edge_twins(None).await.expect("page fetched");
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn module_twin_fetch_maps_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/devices/ghost/twin/modules"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client_for(&server).get_twin_with_modules("ghost").await.unwrap_err();
    assert!(matches!(err, FleetError::NotFound(_)));
}

#[tokio::test]
async fn execute_command_posts_to_command_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/devices/dev-1/commands/C-DAY"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).execute_command("dev-1", "C-DAY").await.expect("command accepted");
}

#[tokio::test]
async fn rejected_command_maps_to_dispatch_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/devices/dev-1/commands/C-DAY"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server).execute_command("dev-1", "C-DAY").await.unwrap_err();
    assert!(matches!(err, FleetError::Dispatch(_)));
}

#[tokio::test]
async fn auth_rejection_maps_to_registry_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/devices/twins"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client_for(&server).get_device_twins(None).await.unwrap_err();
    assert!(matches!(err, FleetError::Registry(_)));
}
