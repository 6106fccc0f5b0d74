//! Integration tests for the token refresh state machine.
//!
//! These verify that OAuth-backed connectors:
//! - Fetch a token at connect and reuse it while valid
//! - Proactively refresh before sending with an expired token
//! - Reactively refresh once on a 401 and retry exactly once
//! - Surface authentication failures from the token endpoint

use std::collections::HashMap;
use std::time::Duration;

use ccef_connections::{
    ActionNetworkConnector, Connection, CredentialStore, Error, HelpScoutConnector, RetryOn,
    RetryPolicy,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn helpscout_store() -> CredentialStore {
    CredentialStore::with_env(HashMap::from([(
        "HELPSCOUT_CREDENTIALS_PASSWORD".to_string(),
        r#"{"app_id": "app-id", "app_secret": "app-secret"}"#.to_string(),
    )]))
}

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::ZERO, Duration::ZERO, 2.0, RetryOn::Transient)
}

fn helpscout(server: &MockServer) -> HelpScoutConnector {
    HelpScoutConnector::new(helpscout_store())
        .with_base_urls(server.uri(), format!("{}/oauth2/token", server.uri()))
        .with_retry(no_retry())
}

async fn mount_token_endpoint(server: &MockServer, expires_in: i64, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": expires_in,
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn valid_token_fetched_once_and_reused() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/conversations/1"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .expect(2)
        .mount(&server)
        .await;

    let mut connector = helpscout(&server);
    connector.connect().await.unwrap();
    assert!(connector.is_connected());

    let first = connector.get_conversation(1).await.unwrap();
    let second = connector.get_conversation(1).await.unwrap();
    assert_eq!(first["id"], 1);
    assert_eq!(second["id"], 1);
}

#[tokio::test]
async fn token_within_safety_margin_is_refreshed_before_each_request() {
    let server = MockServer::start().await;
    // A 60s TTL is consumed entirely by the safety margin, so every
    // request sees an expired token: one fetch at connect plus one per
    // request.
    mount_token_endpoint(&server, 60, 3).await;

    Mock::given(method("GET"))
        .and(path("/conversations/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .expect(2)
        .mount(&server)
        .await;

    let mut connector = helpscout(&server);
    connector.connect().await.unwrap();
    connector.get_conversation(1).await.unwrap();
    connector.get_conversation(1).await.unwrap();
}

#[tokio::test]
async fn observed_401_triggers_one_refresh_and_one_retry() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 3600, 2).await;

    // First API call is rejected, the retried call succeeds.
    Mock::given(method("GET"))
        .and(path("/conversations/7"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
        .expect(1)
        .mount(&server)
        .await;

    let mut connector = helpscout(&server);
    connector.connect().await.unwrap();
    let conversation = connector.get_conversation(7).await.unwrap();
    assert_eq!(conversation["id"], 7);
}

#[tokio::test]
async fn still_401_after_refresh_is_authentication_failure() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 3600, 2).await;

    Mock::given(method("GET"))
        .and(path("/conversations/7"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .expect(2)
        .mount(&server)
        .await;

    let mut connector = helpscout(&server);
    connector.connect().await.unwrap();
    let err = connector.get_conversation(7).await.unwrap_err();
    match err {
        Error::AuthenticationFailure { status, body, .. } => {
            assert_eq!(status, 401);
            assert_eq!(body, "nope");
        }
        other => panic!("expected AuthenticationFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn token_endpoint_rejection_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error": "invalid_client"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut connector = helpscout(&server);
    let err = connector.connect().await.unwrap_err();
    match err {
        Error::AuthenticationFailure { status, body, .. } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_client"));
        }
        other => panic!("expected AuthenticationFailure, got {other:?}"),
    }
    assert!(!connector.is_connected());
}

#[tokio::test]
async fn static_credential_services_fail_immediately_on_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/p1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let store = CredentialStore::with_env(HashMap::from([(
        "ACTION_NETWORK_API_KEY_PASSWORD".to_string(),
        "key-123".to_string(),
    )]));
    let mut connector = ActionNetworkConnector::new(store)
        .with_base_url(server.uri())
        .with_retry(no_retry());

    let err = connector.get_person("p1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::AuthenticationFailure { status: 401, .. }
    ));
}

#[tokio::test]
async fn disconnect_resets_token_state() {
    let server = MockServer::start().await;
    // One fetch per connect.
    mount_token_endpoint(&server, 3600, 2).await;

    Mock::given(method("GET"))
        .and(path("/conversations/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .mount(&server)
        .await;

    let mut connector = helpscout(&server);
    connector.connect().await.unwrap();
    connector.get_conversation(1).await.unwrap();

    connector.disconnect();
    assert!(!connector.is_connected());

    // Auto-connect on next use runs the exchange again.
    connector.get_conversation(1).await.unwrap();
    assert!(connector.is_connected());
}
