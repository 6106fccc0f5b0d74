//! Integration tests for the spreadsheet-backed configuration manager:
//! sheet parsing, TTL behavior, environment overrides, and the
//! no-cache/stale-cache paths.

use std::collections::HashMap;
use std::time::Duration;

use ccef_connections::{
    ConfigManager, ConfigValue, CredentialStore, Error, RetryOn, RetryPolicy, SheetsConnector,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sheets_store() -> CredentialStore {
    CredentialStore::with_env(HashMap::from([(
        "GOOGLE_SHEETS_CREDENTIALS_PASSWORD".to_string(),
        r#"{"client_id": "c", "client_secret": "s", "refresh_token": "r"}"#.to_string(),
    )]))
}

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::ZERO, Duration::ZERO, 2.0, RetryOn::Transient)
}

async fn sheets(server: &MockServer) -> SheetsConnector {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
    SheetsConnector::new(sheets_store())
        .with_base_urls(server.uri(), format!("{}/token", server.uri()))
        .with_retry(no_retry())
}

async fn mount_config_sheet(server: &MockServer, expected_reads: u64) {
    Mock::given(method("GET"))
        .and(path("/sheet-1/values/Config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Config!A1:D4",
            "values": [
                ["Section", "Key", "Value", "Description"],
                ["airtable", "base_id", "appXYZ", "Airtable base"],
                ["openai", "temperature", "0.25", "sampling temperature"],
                ["sync", "enabled", "yes", "master switch"],
            ],
        })))
        .expect(expected_reads)
        .mount(server)
        .await;
}

#[tokio::test]
async fn loads_sections_with_coerced_values() {
    let server = MockServer::start().await;
    mount_config_sheet(&server, 1).await;

    let mut config = ConfigManager::new(sheets(&server).await, "sheet-1");
    assert_eq!(
        config.get("airtable", "base_id").await.unwrap(),
        Some(ConfigValue::Str("appXYZ".to_string()))
    );
    assert_eq!(
        config.get("openai", "temperature").await.unwrap(),
        Some(ConfigValue::Float(0.25))
    );
    assert_eq!(
        config.get("sync", "enabled").await.unwrap(),
        Some(ConfigValue::Bool(true))
    );
    assert_eq!(config.get("sync", "missing").await.unwrap(), None);
}

#[tokio::test]
async fn cache_is_reused_within_ttl() {
    let server = MockServer::start().await;
    mount_config_sheet(&server, 1).await;

    let mut config = ConfigManager::new(sheets(&server).await, "sheet-1");
    config.get("airtable", "base_id").await.unwrap();
    config.get("openai", "temperature").await.unwrap();
    assert!(config.is_cache_valid());
}

#[tokio::test]
async fn zero_ttl_refreshes_every_read() {
    let server = MockServer::start().await;
    mount_config_sheet(&server, 2).await;

    let mut config =
        ConfigManager::new(sheets(&server).await, "sheet-1").with_ttl(Duration::ZERO);
    config.get("airtable", "base_id").await.unwrap();
    config.get("airtable", "base_id").await.unwrap();
}

#[tokio::test]
async fn expired_cache_returned_stale_when_auto_refresh_disabled() {
    let server = MockServer::start().await;
    mount_config_sheet(&server, 1).await;

    let mut config = ConfigManager::new(sheets(&server).await, "sheet-1")
        .with_ttl(Duration::ZERO)
        .with_auto_refresh(false);
    config.refresh().await.unwrap();

    // Expired immediately, but still served.
    let value = config.get("airtable", "base_id").await.unwrap();
    assert_eq!(value, Some(ConfigValue::Str("appXYZ".to_string())));
    assert!(!config.is_cache_valid());
}

#[tokio::test]
async fn no_cache_without_auto_refresh_is_configuration_failure() {
    let server = MockServer::start().await;
    let mut config =
        ConfigManager::new(sheets(&server).await, "sheet-1").with_auto_refresh(false);

    let err = config.get("airtable", "base_id").await.unwrap_err();
    assert!(matches!(err, Error::ConfigurationFailure { .. }));
}

#[tokio::test]
async fn unreachable_sheet_is_configuration_failure() {
    let store = sheets_store();
    let sheets = SheetsConnector::new(store)
        .with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9/token")
        .with_retry(no_retry());
    let mut config = ConfigManager::new(sheets, "sheet-1");

    let err = config.get("airtable", "base_id").await.unwrap_err();
    assert!(matches!(err, Error::ConfigurationFailure { .. }));
}

#[tokio::test]
async fn env_override_applies_after_coercion() {
    let server = MockServer::start().await;
    mount_config_sheet(&server, 1).await;
    std::env::set_var("CCEF_AIRTABLE_BASE_ID", "appOVERRIDE");

    let mut config = ConfigManager::new(sheets(&server).await, "sheet-1");
    let value = config.get("airtable", "base_id").await.unwrap();
    assert_eq!(value, Some(ConfigValue::Str("appOVERRIDE".to_string())));

    std::env::remove_var("CCEF_AIRTABLE_BASE_ID");
}

#[tokio::test]
async fn clear_cache_forces_reload() {
    let server = MockServer::start().await;
    mount_config_sheet(&server, 2).await;

    let mut config = ConfigManager::new(sheets(&server).await, "sheet-1");
    config.get("airtable", "base_id").await.unwrap();
    config.clear_cache();
    assert!(!config.is_cache_valid());
    config.get("airtable", "base_id").await.unwrap();
}
