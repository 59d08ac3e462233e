//! Client behaviour against a mocked HuaweiCloud endpoint: request signing,
//! project resolution, retries and 404 handling.

mod common;

use carina_core::resource::{Resource, ResourceId, Value};
use carina_provider_huaweicloud::ProviderConfig;
use common::{PROJECT_ID, REGION, config, provider};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn accounts_data_source() -> Resource {
    Resource::data_source("ddm_accounts", "all").with_attribute("instance_id", "i1")
}

async fn mount_empty_users(server: &MockServer, project_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{}/instances/i1/users", project_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": []})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn requests_are_signed_with_access_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p1/instances/i1/users"))
        .and(header_exists("X-Sdk-Date"))
        .and(header("X-Project-Id", PROJECT_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": []})))
        .mount(&server)
        .await;

    let p = provider(config(&server, &["ddm"]).with_credentials("AK123", "SK456"));
    p.read_data_source_resource(&accounts_data_source())
        .await
        .unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    assert!(!requests.is_empty());
    for request in requests {
        let auth = request
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(auth.starts_with("SDK-HMAC-SHA256 Access=AK123, SignedHeaders="));
        assert!(auth.contains("x-sdk-date"));
        assert!(!auth.contains("SK456"));
    }
}

#[tokio::test]
async fn unsigned_without_credentials() {
    let server = MockServer::start().await;
    mount_empty_users(&server, PROJECT_ID).await;

    let p = provider(config(&server, &["ddm"]));
    p.read_data_source_resource(&accounts_data_source())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.headers.contains_key("Authorization")));
}

#[tokio::test]
async fn project_id_is_resolved_once_per_region() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .and(query_param("name", REGION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [
                {"id": "other", "name": "cn-north-4_sub"},
                {"id": "p9", "name": REGION}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_empty_users(&server, "p9").await;

    let config = ProviderConfig::new(REGION)
        .with_endpoint("iam", server.uri())
        .with_endpoint("ddm", server.uri());
    let p = provider(config);
    for _ in 0..2 {
        let state = p
            .read_data_source_resource(&accounts_data_source())
            .await
            .unwrap();
        assert_eq!(state.get("accounts"), Some(&Value::List(vec![])));
    }
}

#[tokio::test]
async fn missing_project_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projects": []})))
        .mount(&server)
        .await;

    let config = ProviderConfig::new(REGION)
        .with_endpoint("iam", server.uri())
        .with_endpoint("ddm", server.uri());
    let err = provider(config)
        .read_data_source_resource(&accounts_data_source())
        .await
        .unwrap_err();
    assert!(err.message.contains("error creating DDM client"));
    assert!(err.to_string().contains("no IAM project found"));
}

#[tokio::test]
async fn throttled_requests_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p1/instances/i1/users"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_empty_users(&server, PROJECT_ID).await;

    let p = provider(config(&server, &["ddm"]));
    p.read_data_source_resource(&accounts_data_source())
        .await
        .unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn retries_stop_at_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p1/instances/i1/users"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let p = provider(config(&server, &["ddm"]).with_max_retries(1));
    let err = p
        .read_data_source_resource(&accounts_data_source())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("429"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn not_found_reads_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p1/instances/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "DBS.200823",
            "error_msg": "instance not found"
        })))
        .mount(&server)
        .await;

    let p = provider(config(&server, &["ddm"]));
    let state = p
        .read_resource(
            &ResourceId::new("ddm_instance", "db"),
            Some("gone"),
            Default::default(),
        )
        .await
        .unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn server_errors_surface_status_and_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p1/instances/i1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DBS.280238",
            "error_msg": "bad request"
        })))
        .mount(&server)
        .await;

    let p = provider(config(&server, &["ddm"]));
    let err = p
        .read_resource(
            &ResourceId::new("ddm_instance", "db"),
            Some("i1"),
            Default::default(),
        )
        .await
        .unwrap_err();
    assert!(err.message.contains("error retrieving DDM instance"));
    assert!(err.to_string().contains("400"));
}
