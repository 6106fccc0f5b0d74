//! Airtable connector.
//!
//! Record operations against the Airtable REST API with automatic
//! credential management and rate-limit-aware retries. Listing follows
//! Airtable's `offset` continuation token.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::core::connection::Connection;
use crate::core::credentials::CredentialStore;
use crate::core::http::{disconnected, Auth, RestClient};
use crate::core::pagination::PageStyle;
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "Airtable";
const API_BASE: &str = "https://api.airtable.com/v0";
const RATE_LIMIT_DEFAULT_SECS: u64 = 30;
const PAGE_STYLE: PageStyle = PageStyle::PageToken {
    param: "offset",
    field: "offset",
    size: ("pageSize", 100),
};

/// Airtable writes records in batches of at most 10.
const BATCH_SIZE: usize = 10;

/// Airtable connector with automatic credential management.
///
/// # Example
///
/// ```rust,ignore
/// let mut airtable = AirtableConnector::new(store);
/// let pending = airtable
///     .get_records("appXXX", "Test Input", Some("{status} = 'pending'"), None, None)
///     .await?;
/// ```
pub struct AirtableConnector {
    credentials: CredentialStore,
    api_base: String,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl AirtableConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            retry: RetryPolicy::airtable(),
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

    /// Get records from a table, following pagination to the end.
    ///
    /// `formula` is an Airtable filter formula; `max_records` and `view`
    /// are passed through when given.
    pub async fn get_records(
        &mut self,
        base_id: &str,
        table_name: &str,
        formula: Option<&str>,
        max_records: Option<u32>,
        view: Option<&str>,
    ) -> Result<Vec<Value>, Error> {
        let mut params = Vec::new();
        if let Some(formula) = formula {
            params.push(("filterByFormula".to_string(), formula.to_string()));
        }
        if let Some(max_records) = max_records {
            params.push(("maxRecords".to_string(), max_records.to_string()));
        }
        if let Some(view) = view {
            params.push(("view".to_string(), view.to_string()));
        }
        self.client()
            .await?
            .paginate_retry(
                &format!("/{base_id}/{table_name}"),
                "records",
                &params,
                &PAGE_STYLE,
            )
            .await
    }

    /// Get a single record by id.
    pub async fn get_record(
        &mut self,
        base_id: &str,
        table_name: &str,
        record_id: &str,
    ) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(
                Method::GET,
                &format!("/{base_id}/{table_name}/{record_id}"),
                &[],
                None,
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Create a new record.
    pub async fn create_record(
        &mut self,
        base_id: &str,
        table_name: &str,
        fields: Value,
    ) -> Result<Value, Error> {
        let body = json!({ "fields": fields });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/{base_id}/{table_name}"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Update a single record's fields.
    pub async fn update_record(
        &mut self,
        base_id: &str,
        table_name: &str,
        record_id: &str,
        fields: Value,
    ) -> Result<Value, Error> {
        let body = json!({ "fields": fields });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::PATCH,
                &format!("/{base_id}/{table_name}/{record_id}"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Update multiple records. Each record carries `id` and `fields`;
    /// writes go out in API-sized batches and the updated records come
    /// back concatenated in order.
    pub async fn batch_update(
        &mut self,
        base_id: &str,
        table_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, Error> {
        let path = format!("/{base_id}/{table_name}");
        let mut updated = Vec::with_capacity(records.len());
        for chunk in records.chunks(BATCH_SIZE) {
            let body = json!({ "records": chunk });
            let result = self
                .client()
                .await?
                .request_retry(Method::PATCH, &path, &[], Some(&body))
                .await?;
            if let Some(items) = result
                .as_ref()
                .and_then(|value| value.get("records"))
                .and_then(Value::as_array)
            {
                updated.extend(items.iter().cloned());
            }
        }
        Ok(updated)
    }

    /// Delete a record.
    pub async fn delete_record(
        &mut self,
        base_id: &str,
        table_name: &str,
        record_id: &str,
    ) -> Result<(), Error> {
        self.client()
            .await?
            .request_retry(
                Method::DELETE,
                &format!("/{base_id}/{table_name}/{record_id}"),
                &[],
                None,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for AirtableConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let api_key = self.credentials.airtable_key()?;
        let client = RestClient::new(
            "Airtable",
            self.api_base.clone(),
            Auth::BearerKey(api_key),
            self.retry.clone(),
        )?
        .rate_limit_default(RATE_LIMIT_DEFAULT_SECS);
        self.client = Some(client);
        tracing::info!("connected to Airtable");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from Airtable");
    }

    async fn health_check(&mut self) -> bool {
        self.client.is_some()
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}
