//! Action Builder connector.
//!
//! Access to the Action Builder API (OSDI v1.2.0): Campaigns, Entity
//! Types, Connection Types, People/Entities, Tags, Taggings, and
//! Connections. Authentication is a static API token in the
//! `OSDI-Api-Token` header; pagination is page-based
//! (`page`/`per_page`/`total_pages`) rather than cursor-based.
//!
//! API limitations:
//! - Connections can only be read or updated (no create via API)
//! - Taggings can only be read or deleted (no create/update via API)
//!
//! Tag update pattern: replacing an existing tag value takes two calls —
//! `delete_tagging` for the old value (404 counts as success: the tagging
//! is already absent), then `update_entity_with_tags` to write the new
//! value via the Person Signup Helper. There is no `remove_tags` parameter
//! in the POST body; passing one causes a 500 from the AB API.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::core::connection::Connection;
use crate::core::credentials::CredentialStore;
use crate::core::http::{disconnected, Auth, RestClient};
use crate::core::pagination::PageStyle;
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "Action Builder";
const PAGE_STYLE: PageStyle = PageStyle::PageNumber { per_page: 25 };

fn default_base_url(subdomain: &str) -> String {
    format!("https://{subdomain}.actionbuilder.org/api/rest/v1")
}

/// Action Builder connector for field organizing and relationship mapping.
///
/// Credentials are stored as JSON in `ACTION_BUILDER_CREDENTIALS_PASSWORD`:
/// `{"api_token": "...", "subdomain": "..."}`.
pub struct ActionBuilderConnector {
    credentials: CredentialStore,
    base_override: Option<String>,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl ActionBuilderConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            base_override: None,
            retry: RetryPolicy::action_builder(),
            client: None,
        }
    }

    /// Use a fixed API base instead of the subdomain-derived one (staging,
    /// tests).
    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.base_override = Some(api_base.into());
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

    fn modified_since_params(modified_since: Option<&str>) -> Vec<(String, String)> {
        match modified_since {
            Some(timestamp) => vec![(
                "filter".to_string(),
                format!("modified_date gt '{timestamp}'"),
            )],
            None => Vec::new(),
        }
    }

    // -- Campaigns ------------------------------------------------------------

    /// List all campaigns, optionally filtered to those modified after an
    /// ISO-8601 timestamp.
    pub async fn list_campaigns(
        &mut self,
        modified_since: Option<&str>,
    ) -> Result<Vec<Value>, Error> {
        let params = Self::modified_since_params(modified_since);
        self.list("/campaigns", "action_builder:campaigns", &params)
            .await
    }

    /// Get a single campaign by UUID.
    pub async fn get_campaign(&mut self, campaign_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/campaigns/{campaign_id}")).await
    }

    // -- Entity types (read-only) ---------------------------------------------

    /// List entity types for a campaign.
    pub async fn list_entity_types(&mut self, campaign_id: &str) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/campaigns/{campaign_id}/entity_types"),
            "action_builder:entity_types",
            &[],
        )
        .await
    }

    /// Get a single entity type.
    pub async fn get_entity_type(
        &mut self,
        campaign_id: &str,
        type_id: &str,
    ) -> Result<Value, Error> {
        self.get_one(&format!("/campaigns/{campaign_id}/entity_types/{type_id}"))
            .await
    }

    // -- Connection types (read-only) -----------------------------------------

    /// List connection types for a campaign.
    pub async fn list_connection_types(&mut self, campaign_id: &str) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/campaigns/{campaign_id}/connection_types"),
            "action_builder:connection_types",
            &[],
        )
        .await
    }

    /// Get a single connection type.
    pub async fn get_connection_type(
        &mut self,
        campaign_id: &str,
        type_id: &str,
    ) -> Result<Value, Error> {
        self.get_one(&format!(
            "/campaigns/{campaign_id}/connection_types/{type_id}"
        ))
        .await
    }

    // -- People / entities ----------------------------------------------------

    /// List people/entities in a campaign, optionally filtered by
    /// modification date.
    pub async fn list_people(
        &mut self,
        campaign_id: &str,
        modified_since: Option<&str>,
    ) -> Result<Vec<Value>, Error> {
        let params = Self::modified_since_params(modified_since);
        self.list(
            &format!("/campaigns/{campaign_id}/people"),
            "osdi:people",
            &params,
        )
        .await
    }

    /// Get a single person/entity.
    pub async fn get_person(
        &mut self,
        campaign_id: &str,
        person_id: &str,
    ) -> Result<Value, Error> {
        self.get_one(&format!("/campaigns/{campaign_id}/people/{person_id}"))
            .await
    }

    /// Create a new person/entity in a campaign.
    pub async fn create_person(
        &mut self,
        campaign_id: &str,
        fields: Value,
    ) -> Result<Value, Error> {
        let body = json!({ "person": fields });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/campaigns/{campaign_id}/people"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Update an existing person/entity.
    pub async fn update_person(
        &mut self,
        campaign_id: &str,
        person_id: &str,
        fields: &Value,
    ) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(
                Method::PUT,
                &format!("/campaigns/{campaign_id}/people/{person_id}"),
                &[],
                Some(fields),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Delete a person/entity from a campaign.
    pub async fn delete_person(
        &mut self,
        campaign_id: &str,
        person_id: &str,
    ) -> Result<(), Error> {
        self.client()
            .await?
            .request_retry(
                Method::DELETE,
                &format!("/campaigns/{campaign_id}/people/{person_id}"),
                &[],
                None,
            )
            .await?;
        Ok(())
    }

    // -- Tags -----------------------------------------------------------------

    /// List all tags for a campaign.
    pub async fn list_tags(&mut self, campaign_id: &str) -> Result<Vec<Value>, Error> {
        self.list(&format!("/campaigns/{campaign_id}/tags"), "osdi:tags", &[])
            .await
    }

    /// Get a single tag.
    pub async fn get_tag(&mut self, campaign_id: &str, tag_id: &str) -> Result<Value, Error> {
        self.get_one(&format!("/campaigns/{campaign_id}/tags/{tag_id}"))
            .await
    }

    /// Create a new tag (field) in a campaign.
    pub async fn create_tag(
        &mut self,
        campaign_id: &str,
        name: &str,
        section: &str,
        field_type: &str,
    ) -> Result<Value, Error> {
        let body = json!({
            "name": name,
            "section": section,
            "field_type": field_type,
        });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/campaigns/{campaign_id}/tags"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Delete a tag from a campaign.
    pub async fn delete_tag(&mut self, campaign_id: &str, tag_id: &str) -> Result<(), Error> {
        self.client()
            .await?
            .request_retry(
                Method::DELETE,
                &format!("/campaigns/{campaign_id}/tags/{tag_id}"),
                &[],
                None,
            )
            .await?;
        Ok(())
    }

    // -- Taggings (read + delete only) ----------------------------------------

    /// List all taggings for a tag.
    pub async fn list_taggings(
        &mut self,
        campaign_id: &str,
        tag_id: &str,
    ) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/campaigns/{campaign_id}/tags/{tag_id}/taggings"),
            "osdi:taggings",
            &[],
        )
        .await
    }

    /// List all taggings for a person/entity.
    pub async fn list_person_taggings(
        &mut self,
        campaign_id: &str,
        person_id: &str,
    ) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/campaigns/{campaign_id}/people/{person_id}/taggings"),
            "osdi:taggings",
            &[],
        )
        .await
    }

    /// Delete a tagging.
    ///
    /// A 404 response is treated as success: if the tagging no longer
    /// exists (e.g. deleted by a previous sync run), the desired state is
    /// already achieved.
    pub async fn delete_tagging(
        &mut self,
        campaign_id: &str,
        tag_id: &str,
        tagging_id: &str,
    ) -> Result<(), Error> {
        let path = format!("/campaigns/{campaign_id}/tags/{tag_id}/taggings/{tagging_id}");
        match self
            .client()
            .await?
            .request_retry(Method::DELETE, &path, &[], None)
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::RequestFailure { status: 404, .. }) => {
                tracing::debug!(tagging_id, "tagging already absent (404), skipping");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    // -- Connections (read + update only) -------------------------------------

    /// List all connections for a person/entity.
    pub async fn list_connections(
        &mut self,
        campaign_id: &str,
        person_id: &str,
    ) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/campaigns/{campaign_id}/people/{person_id}/connections"),
            "action_builder:connections",
            &[],
        )
        .await
    }

    /// Get a single connection.
    pub async fn get_connection(
        &mut self,
        campaign_id: &str,
        person_id: &str,
        connection_id: &str,
    ) -> Result<Value, Error> {
        self.get_one(&format!(
            "/campaigns/{campaign_id}/people/{person_id}/connections/{connection_id}"
        ))
        .await
    }

    /// Update a connection's inactive status.
    pub async fn update_connection(
        &mut self,
        campaign_id: &str,
        person_id: &str,
        connection_id: &str,
        inactive: bool,
    ) -> Result<Value, Error> {
        let body = json!({ "inactive": inactive });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::PUT,
                &format!(
                    "/campaigns/{campaign_id}/people/{person_id}/connections/{connection_id}"
                ),
                &[],
                Some(&body),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    // -- Person Signup Helper writes ------------------------------------------

    /// Update an existing entity's tags via the Person Signup Helper.
    ///
    /// Posting with `identifiers` set to the entity's interact_id tells
    /// Action Builder to update the existing entity rather than create a
    /// new one. Each tag dict carries `action_builder:section`,
    /// `action_builder:field`, and `name`.
    pub async fn update_entity_with_tags(
        &mut self,
        campaign_id: &str,
        entity_interact_id: &str,
        add_tags: Value,
    ) -> Result<Value, Error> {
        let body = json!({
            "person": {
                "identifiers": [format!("action_builder:{entity_interact_id}")],
            },
            "add_tags": add_tags,
        });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/campaigns/{campaign_id}/people"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Insert a new entity via the Person Signup Helper (no `identifiers`,
    /// so Action Builder creates a new entity).
    pub async fn insert_entity(
        &mut self,
        campaign_id: &str,
        person_data: Value,
        add_tags: Option<Value>,
    ) -> Result<Value, Error> {
        let mut body = json!({ "person": person_data });
        if let Some(add_tags) = add_tags {
            body["add_tags"] = add_tags;
        }
        let result = self
            .client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/campaigns/{campaign_id}/people"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }
}

#[async_trait]
impl Connection for ActionBuilderConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let creds = self.credentials.action_builder_credentials()?;
        let base_url = match &self.base_override {
            Some(base) => base.clone(),
            None => default_base_url(&creds.subdomain),
        };
        let client = RestClient::new(
            "Action Builder",
            base_url,
            Auth::HeaderKey {
                header: "osdi-api-token",
                key: creds.api_token,
            },
            self.retry.clone(),
        )?;
        self.client = Some(client);
        tracing::info!("connected to Action Builder");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from Action Builder");
    }

    /// Probe by fetching the first page of campaigns.
    async fn health_check(&mut self) -> bool {
        match &mut self.client {
            Some(client) => {
                let params = [
                    ("page".to_string(), "1".to_string()),
                    ("per_page".to_string(), "1".to_string()),
                ];
                client
                    .request(Method::GET, "/campaigns", &params, None)
                    .await
                    .is_ok()
            }
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}
