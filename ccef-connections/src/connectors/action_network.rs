//! Action Network connector.
//!
//! Read/write access to the Action Network API v2, covering People, Tags,
//! Taggings, Events, Attendances, Petitions, Signatures, Forms,
//! Submissions, Fundraising Pages, Donations, Lists, and Messages.
//!
//! Authentication is a static API key in the `OSDI-API-Token` header.
//! Resources follow the OSDI/HAL+JSON format with pagination via
//! `_links.next.href`.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::core::connection::Connection;
use crate::core::credentials::CredentialStore;
use crate::core::http::{disconnected, Auth, RestClient};
use crate::core::pagination::PageStyle;
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "Action Network";
const API_BASE: &str = "https://actionnetwork.org/api/v2";
const PAGE_STYLE: PageStyle = PageStyle::NextLink;

/// Action Network connector for activist CRM operations.
///
/// # Example
///
/// ```rust,ignore
/// let mut an = ActionNetworkConnector::new(store);
/// let people = an.list_people(&[]).await?;
/// an.create_person("activist@example.org", Some("Jane"), Some("Doe"), &["volunteer".into()])
///     .await?;
/// ```
pub struct ActionNetworkConnector {
    credentials: CredentialStore,
    api_base: String,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl ActionNetworkConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            retry: RetryPolicy::action_network(),
            client: None,
        }
    }

    /// Point the connector at a different API base (staging, tests).
    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Replace the default retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn client(&mut self) -> Result<&mut RestClient, Error> {
        if self.client.is_none() {
            self.connect().await?;
        }
        self.client.as_mut().ok_or_else(|| disconnected(SERVICE))
    }

    async fn get_one(&mut self, path: &str) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::GET, path, &[], None)
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    async fn post_one(&mut self, path: &str, body: Value) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::POST, path, &[], Some(&body))
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    async fn put_one(&mut self, path: &str, body: &Value) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::PUT, path, &[], Some(body))
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    async fn list(
        &mut self,
        path: &str,
        resource_key: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry(path, resource_key, params, &PAGE_STYLE)
            .await
    }

    // -- People ---------------------------------------------------------------

    /// List all people, paginated. `filters` are passed as query params.
    pub async fn list_people(&mut self, filters: &[(String, String)]) -> Result<Vec<Value>, Error> {
        self.list("/people", "osdi:people", filters).await
    }

    /// Get a single person by UUID.
    pub async fn get_person(&mut self, person_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/people/{person_id}")).await
    }

    /// Create (or update) a person via the Person Signup Helper.
    ///
    /// `POST /people` deduplicates by email address and supports inline
    /// tagging via `add_tags`.
    pub async fn create_person(
        &mut self,
        email: &str,
        given_name: Option<&str>,
        family_name: Option<&str>,
        tags: &[String],
    ) -> Result<Value, Error> {
        let mut person = json!({
            "email_addresses": [{ "address": email }],
        });
        if let Some(given_name) = given_name {
            person["given_name"] = json!(given_name);
        }
        if let Some(family_name) = family_name {
            person["family_name"] = json!(family_name);
        }
        let mut body = json!({ "person": person });
        if !tags.is_empty() {
            body["add_tags"] = json!(tags);
        }
        self.post_one("/people", body).await
    }

    /// Update a person.
    pub async fn update_person(&mut self, person_id: &str, fields: &Value) -> Result<Value, Error> {
        self.put_one(&format!("/people/{person_id}"), fields).await
    }

    // -- Tags -----------------------------------------------------------------

    /// List all tags, paginated.
    pub async fn list_tags(&mut self) -> Result<Vec<Value>, Error> {
        self.list("/tags", "osdi:tags", &[]).await
    }

    /// Get a single tag by UUID.
    pub async fn get_tag(&mut self, tag_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/tags/{tag_id}")).await
    }

    /// Create a new tag.
    pub async fn create_tag(&mut self, name: &str) -> Result<Value, Error> {
        self.post_one("/tags", json!({ "name": name })).await
    }

    // -- Taggings -------------------------------------------------------------

    /// List all taggings for a tag, paginated.
    pub async fn list_taggings(&mut self, tag_id: &str) -> Result<Vec<Value>, Error> {
        self.list(&format!("/tags/{tag_id}/taggings"), "osdi:taggings", &[])
            .await
    }

    /// Tag one or more people (create a tagging). `person_hrefs` are person
    /// identifier URIs.
    pub async fn add_tagging(
        &mut self,
        tag_id: &str,
        person_hrefs: &[String],
    ) -> Result<Value, Error> {
        let person_link = match person_hrefs {
            [single] => json!({ "href": single }),
            many => json!(many.iter().map(|href| json!({ "href": href })).collect::<Vec<_>>()),
        };
        let body = json!({ "_links": { "osdi:person": person_link } });
        self.post_one(&format!("/tags/{tag_id}/taggings"), body).await
    }

    /// Remove a tagging.
    pub async fn delete_tagging(&mut self, tag_id: &str, tagging_id: &str) -> Result<(), Error> {
        self.client()
            .await?
            .request_retry(
                Method::DELETE,
                &format!("/tags/{tag_id}/taggings/{tagging_id}"),
                &[],
                None,
            )
            .await?;
        Ok(())
    }

    // -- Events ---------------------------------------------------------------

    /// List all events, paginated.
    pub async fn list_events(&mut self) -> Result<Vec<Value>, Error> {
        self.list("/events", "osdi:events", &[]).await
    }

    /// Get a single event by UUID.
    pub async fn get_event(&mut self, event_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/events/{event_id}")).await
    }

    /// Create an event. `start_date` is ISO-8601.
    pub async fn create_event(
        &mut self,
        title: &str,
        start_date: Option<&str>,
    ) -> Result<Value, Error> {
        let mut body = json!({ "title": title });
        if let Some(start_date) = start_date {
            body["start_date"] = json!(start_date);
        }
        self.post_one("/events", body).await
    }

    /// Update an event.
    pub async fn update_event(&mut self, event_id: &str, fields: &Value) -> Result<Value, Error> {
        self.put_one(&format!("/events/{event_id}"), fields).await
    }

    // -- Attendances ----------------------------------------------------------

    /// List attendances for an event, paginated.
    pub async fn list_attendances(&mut self, event_id: &str) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/events/{event_id}/attendances"),
            "osdi:attendances",
            &[],
        )
        .await
    }

    /// Get a single attendance record.
    pub async fn get_attendance(
        &mut self,
        event_id: &str,
        attendance_id: &str,
    ) -> Result<Value, Error> {
        self.get_one(&format!("/events/{event_id}/attendances/{attendance_id}"))
            .await
    }

    /// Record an attendance for an event via the embedded person signup
    /// helper.
    pub async fn create_attendance(
        &mut self,
        event_id: &str,
        person_data: Value,
    ) -> Result<Value, Error> {
        self.post_one(&format!("/events/{event_id}/attendances"), person_data)
            .await
    }

    // -- Petitions ------------------------------------------------------------

    /// List all petitions, paginated.
    pub async fn list_petitions(&mut self) -> Result<Vec<Value>, Error> {
        self.list("/petitions", "osdi:petitions", &[]).await
    }

    /// Get a single petition by UUID.
    pub async fn get_petition(&mut self, petition_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/petitions/{petition_id}")).await
    }

    /// Create a petition.
    pub async fn create_petition(&mut self, title: &str) -> Result<Value, Error> {
        self.post_one("/petitions", json!({ "title": title })).await
    }

    /// Update a petition.
    pub async fn update_petition(
        &mut self,
        petition_id: &str,
        fields: &Value,
    ) -> Result<Value, Error> {
        self.put_one(&format!("/petitions/{petition_id}"), fields)
            .await
    }

    // -- Signatures -----------------------------------------------------------

    /// List signatures for a petition, paginated.
    pub async fn list_signatures(&mut self, petition_id: &str) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/petitions/{petition_id}/signatures"),
            "osdi:signatures",
            &[],
        )
        .await
    }

    /// Get a single signature.
    pub async fn get_signature(
        &mut self,
        petition_id: &str,
        signature_id: &str,
    ) -> Result<Value, Error> {
        self.get_one(&format!("/petitions/{petition_id}/signatures/{signature_id}"))
            .await
    }

    /// Create a signature on a petition.
    pub async fn create_signature(
        &mut self,
        petition_id: &str,
        person_data: Value,
    ) -> Result<Value, Error> {
        self.post_one(&format!("/petitions/{petition_id}/signatures"), person_data)
            .await
    }

    // -- Forms ----------------------------------------------------------------

    /// List all forms, paginated.
    pub async fn list_forms(&mut self) -> Result<Vec<Value>, Error> {
        self.list("/forms", "osdi:forms", &[]).await
    }

    /// Get a single form by UUID.
    pub async fn get_form(&mut self, form_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/forms/{form_id}")).await
    }

    /// Create a form.
    pub async fn create_form(&mut self, title: &str) -> Result<Value, Error> {
        self.post_one("/forms", json!({ "title": title })).await
    }

    // -- Submissions ----------------------------------------------------------

    /// List submissions for a form, paginated.
    pub async fn list_submissions(&mut self, form_id: &str) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/forms/{form_id}/submissions"),
            "osdi:submissions",
            &[],
        )
        .await
    }

    /// Create a submission on a form.
    pub async fn create_submission(
        &mut self,
        form_id: &str,
        person_data: Value,
    ) -> Result<Value, Error> {
        self.post_one(&format!("/forms/{form_id}/submissions"), person_data)
            .await
    }

    // -- Fundraising pages ----------------------------------------------------

    /// List all fundraising pages, paginated.
    pub async fn list_fundraising_pages(&mut self) -> Result<Vec<Value>, Error> {
        self.list("/fundraising_pages", "osdi:fundraising_pages", &[])
            .await
    }

    /// Get a single fundraising page by UUID.
    pub async fn get_fundraising_page(&mut self, page_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/fundraising_pages/{page_id}")).await
    }

    /// List donations for a fundraising page, paginated.
    pub async fn list_donations(&mut self, fundraising_page_id: &str) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/fundraising_pages/{fundraising_page_id}/donations"),
            "osdi:donations",
            &[],
        )
        .await
    }

    /// Create a donation on a fundraising page.
    pub async fn create_donation(
        &mut self,
        fundraising_page_id: &str,
        person_data: Value,
    ) -> Result<Value, Error> {
        self.post_one(
            &format!("/fundraising_pages/{fundraising_page_id}/donations"),
            person_data,
        )
        .await
    }

    // -- Lists ----------------------------------------------------------------

    /// List all lists (queries/segments), paginated.
    pub async fn list_lists(&mut self) -> Result<Vec<Value>, Error> {
        self.list("/lists", "osdi:lists", &[]).await
    }

    /// Get a single list by UUID.
    pub async fn get_list(&mut self, list_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/lists/{list_id}")).await
    }

    // -- Messages -------------------------------------------------------------

    /// List all messages, paginated.
    pub async fn list_messages(&mut self) -> Result<Vec<Value>, Error> {
        self.list("/messages", "osdi:messages", &[]).await
    }

    /// Get a single message by UUID.
    pub async fn get_message(&mut self, message_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/messages/{message_id}")).await
    }

    /// Create a message.
    pub async fn create_message(
        &mut self,
        subject: &str,
        body: Option<&str>,
        targets: Option<Value>,
    ) -> Result<Value, Error> {
        let mut payload = json!({ "subject": subject });
        if let Some(body) = body {
            payload["body"] = json!(body);
        }
        if let Some(targets) = targets {
            payload["targets"] = targets;
        }
        self.post_one("/messages", payload).await
    }
}

#[async_trait]
impl Connection for ActionNetworkConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let api_key = self.credentials.action_network_key()?;
        let client = RestClient::new(
            "Action Network",
            self.api_base.clone(),
            Auth::HeaderKey {
                header: "osdi-api-token",
                key: api_key,
            },
            self.retry.clone(),
        )?
        .content_type("application/hal+json");
        self.client = Some(client);
        tracing::info!("connected to Action Network");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from Action Network");
    }

    /// Probe the API entry point.
    async fn health_check(&mut self) -> bool {
        match &mut self.client {
            Some(client) => client.request(Method::GET, "", &[], None).await.is_ok(),
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}
