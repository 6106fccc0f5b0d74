//! Integration tests for the pagination driver: one transport call per
//! page, items concatenated in order, and termination on the
//! absent/empty/null continuation signal for every style.

use std::collections::HashMap;
use std::time::Duration;

use ccef_connections::{
    ActionBuilderConnector, ActionNetworkConnector, AirtableConnector, CredentialStore,
    RetryOn, RetryPolicy, RoiCrmConnector, ZoomConnector,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::ZERO, Duration::ZERO, 2.0, RetryOn::Transient)
}

fn env(vars: &[(&str, &str)]) -> CredentialStore {
    CredentialStore::with_env(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

async fn mount_token(server: &MockServer, token_path: &str) {
    Mock::given(method("POST"))
        .and(path(token_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn next_link_style_follows_embedded_links() {
    let server = MockServer::start().await;

    // Second page, matched by the query encoded in the next link.
    Mock::given(method("GET"))
        .and(path("/people"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": { "osdi:people": [{ "id": "p3" }] },
            "_links": {},
        })))
        .expect(1)
        .mount(&server)
        .await;
    // First page advertises an absolute next URL sharing the API base.
    Mock::given(method("GET"))
        .and(path("/people"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": { "osdi:people": [{ "id": "p1" }, { "id": "p2" }] },
            "_links": { "next": { "href": format!("{}/people?page=2", server.uri()) } },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = env(&[("ACTION_NETWORK_API_KEY_PASSWORD", "key")]);
    let mut connector = ActionNetworkConnector::new(store)
        .with_base_url(server.uri())
        .with_retry(no_retry());

    let people = connector.list_people(&[]).await.unwrap();
    let ids: Vec<&str> = people.iter().filter_map(|p| p["id"].as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn page_number_style_stops_at_total_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/campaigns"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": { "action_builder:campaigns": [{ "id": "c1" }] },
            "total_pages": 2,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/campaigns"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": { "action_builder:campaigns": [{ "id": "c2" }] },
            "total_pages": 2,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = env(&[(
        "ACTION_BUILDER_CREDENTIALS_PASSWORD",
        r#"{"api_token": "tok", "subdomain": "ccef"}"#,
    )]);
    let mut connector = ActionBuilderConnector::new(store)
        .with_base_url(server.uri())
        .with_retry(no_retry());

    let campaigns = connector.list_campaigns(None).await.unwrap();
    let ids: Vec<&str> = campaigns.iter().filter_map(|c| c["id"].as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
}

#[tokio::test]
async fn page_number_style_defaults_to_single_page() {
    let server = MockServer::start().await;

    // No total_pages in the body reads as one page.
    Mock::given(method("GET"))
        .and(path("/campaigns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": { "action_builder:campaigns": [{ "id": "c1" }] },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = env(&[(
        "ACTION_BUILDER_CREDENTIALS_PASSWORD",
        r#"{"api_token": "tok", "subdomain": "ccef"}"#,
    )]);
    let mut connector = ActionBuilderConnector::new(store)
        .with_base_url(server.uri())
        .with_retry(no_retry());

    let campaigns = connector.list_campaigns(None).await.unwrap();
    assert_eq!(campaigns.len(), 1);
}

#[tokio::test]
async fn page_token_style_follows_continuation_token() {
    let server = MockServer::start().await;
    mount_token(&server, "/token").await;

    Mock::given(method("GET"))
        .and(path("/users/me/meetings"))
        .and(query_param("next_page_token", "tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meetings": [{ "id": 2 }],
            "next_page_token": "",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/meetings"))
        .and(query_param("page_size", "300"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meetings": [{ "id": 1 }],
            "next_page_token": "tok2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = env(&[(
        "ZOOM_CREDENTIALS_PASSWORD",
        r#"{"account_id": "a", "client_id": "c", "client_secret": "s"}"#,
    )]);
    let mut connector = ZoomConnector::new(store)
        .with_base_urls(server.uri(), format!("{}/token", server.uri()))
        .with_retry(no_retry());

    let meetings = connector.list_meetings("me", "scheduled").await.unwrap();
    let ids: Vec<i64> = meetings.iter().filter_map(|m| m["id"].as_i64()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn airtable_offset_token_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/appX/Table"))
        .and(query_param("offset", "itr2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{ "id": "rec2" }],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/appX/Table"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{ "id": "rec1" }],
            "offset": "itr2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = env(&[("AIRTABLE_API_KEY_PASSWORD", "key")]);
    let mut connector = AirtableConnector::new(store)
        .with_base_url(server.uri())
        .with_retry(no_retry());

    let records = connector
        .get_records("appX", "Table", None, None, None)
        .await
        .unwrap();
    let ids: Vec<&str> = records.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["rec1", "rec2"]);
}

#[tokio::test]
async fn items_next_style_stops_on_null_next() {
    let server = MockServer::start().await;
    mount_token(&server, "/oauth/token").await;

    Mock::given(method("GET"))
        .and(path("/donors/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": 1 }, { "id": 2 }],
            "next": "https://app.roicrm.net/api/1.0/donors/?page=2",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/donors/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": 3 }],
            "next": null,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = env(&[(
        "ROI_CRM_CREDENTIALS_PASSWORD",
        r#"{"client_id": "c", "client_secret": "s", "audience": "aud", "roi_client_code": "ccef"}"#,
    )]);
    let mut connector = RoiCrmConnector::new(store)
        .with_base_urls(server.uri(), format!("{}/oauth/token", server.uri()))
        .with_retry(no_retry());

    let donors = connector.search_donors(&[]).await.unwrap();
    let ids: Vec<i64> = donors.iter().filter_map(|d| d["id"].as_i64()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn single_page_listing_makes_exactly_one_call() {
    let server = MockServer::start().await;
    mount_token(&server, "/token").await;

    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [{ "id": 9 }],
            "next_page_token": "",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = env(&[(
        "ZOOM_CREDENTIALS_PASSWORD",
        r#"{"account_id": "a", "client_id": "c", "client_secret": "s"}"#,
    )]);
    let mut connector = ZoomConnector::new(store)
        .with_base_urls(server.uri(), format!("{}/token", server.uri()))
        .with_retry(no_retry());

    let webinars = connector.list_webinars("me").await.unwrap();
    assert_eq!(webinars.len(), 1);
}
