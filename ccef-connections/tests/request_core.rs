//! Integration tests for the HTTP request core: status-to-error mapping,
//! header construction, and the retrying wrappers.

use std::collections::HashMap;
use std::time::Duration;

use ccef_connections::{
    ActionNetworkConnector, Connection, CredentialStore, Error, HelpScoutConnector, RetryOn,
    RetryPolicy,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn an_store() -> CredentialStore {
    CredentialStore::with_env(HashMap::from([(
        "ACTION_NETWORK_API_KEY_PASSWORD".to_string(),
        "key-123".to_string(),
    )]))
}

fn helpscout_store() -> CredentialStore {
    CredentialStore::with_env(HashMap::from([(
        "HELPSCOUT_CREDENTIALS_PASSWORD".to_string(),
        r#"{"app_id": "app-id", "app_secret": "app-secret"}"#.to_string(),
    )]))
}

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::ZERO, Duration::ZERO, 2.0, RetryOn::Transient)
}

fn fast_transient(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::ZERO,
        Duration::ZERO,
        2.0,
        RetryOn::Transient,
    )
}

fn action_network(server: &MockServer) -> ActionNetworkConnector {
    ActionNetworkConnector::new(an_store())
        .with_base_url(server.uri())
        .with_retry(no_retry())
}

async fn mount_helpscout_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn api_key_sent_in_osdi_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/p1"))
        .and(header("osdi-api-token", "key-123"))
        .and(header("content-type", "application/hal+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut connector = action_network(&server);
    let person = connector.get_person("p1").await.unwrap();
    assert_eq!(person["id"], "p1");
}

#[tokio::test]
async fn rate_limit_carries_retry_after_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/p1"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "5")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let mut connector = action_network(&server);
    let err = connector.get_person("p1").await.unwrap_err();
    match err {
        Error::RateLimitExceeded { retry_after, .. } => assert_eq!(retry_after, 5),
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_without_header_uses_service_default() {
    let server = MockServer::start().await;
    mount_helpscout_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations/1"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let mut connector = HelpScoutConnector::new(helpscout_store())
        .with_base_urls(server.uri(), format!("{}/oauth2/token", server.uri()))
        .with_retry(no_retry());

    let err = connector.get_conversation(1).await.unwrap_err();
    match err {
        // HelpScout's documented default wait.
        Error::RateLimitExceeded { retry_after, .. } => assert_eq!(retry_after, 10),
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn no_content_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/tags/t1/taggings/g1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut connector = action_network(&server);
    connector.delete_tagging("t1", "g1").await.unwrap();
}

#[tokio::test]
async fn generic_http_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/p1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal meltdown"))
        .mount(&server)
        .await;

    let mut connector = action_network(&server);
    let err = connector.get_person("p1").await.unwrap_err();
    match err {
        Error::RequestFailure { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal meltdown");
        }
        other => panic!("expected RequestFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_json_body_is_connection_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let mut connector = action_network(&server);
    let err = connector.get_person("p1").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailure { .. }));
}

#[tokio::test]
async fn unreachable_host_is_connection_failure() {
    // Nothing listens on the discard port.
    let store = an_store();
    let mut connector = ActionNetworkConnector::new(store)
        .with_base_url("http://127.0.0.1:9")
        .with_retry(no_retry());

    let err = connector.get_person("p1").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailure { .. }));
}

#[tokio::test]
async fn transient_failures_retried_until_success() {
    let server = MockServer::start().await;
    mount_helpscout_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations/1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let mut connector = HelpScoutConnector::new(helpscout_store())
        .with_base_urls(server.uri(), format!("{}/oauth2/token", server.uri()))
        .with_retry(fast_transient(5));

    let conversation = connector.get_conversation(1).await.unwrap();
    assert_eq!(conversation["id"], 1);
}

#[tokio::test]
async fn rate_limit_only_policy_does_not_retry_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/p1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    // The Action Network preset retries 429s only; the 500 must surface
    // after a single call.
    let store = an_store();
    let mut connector = ActionNetworkConnector::new(store).with_base_url(server.uri());

    let err = connector.get_person("p1").await.unwrap_err();
    assert!(matches!(err, Error::RequestFailure { status: 500, .. }));
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let store = CredentialStore::with_env(HashMap::new());
    let mut connector = ActionNetworkConnector::new(store).with_base_url("http://127.0.0.1:9");

    let err = connector.list_tags().await.unwrap_err();
    match err {
        Error::MissingCredential { var } => {
            assert_eq!(var, "ACTION_NETWORK_API_KEY_PASSWORD");
        }
        other => panic!("expected MissingCredential, got {other:?}"),
    }
    assert!(!connector.is_connected());
}
