//! BigQuery connector.
//!
//! READ and WRITE access to Google BigQuery for data warehouse operations
//! via the BigQuery REST API v2 with Google OAuth credentials. Query and
//! DML failures reported in an otherwise-successful response surface as
//! [`Error::QueryFailure`] / [`Error::WriteFailure`].

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::connectors::google::{GoogleTokenExchange, GOOGLE_TOKEN_URL};
use crate::core::connection::Connection;
use crate::core::credentials::CredentialStore;
use crate::core::http::{disconnected, Auth, OAuthSession, RestClient};
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "BigQuery";
const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// BigQuery connector for data warehouse operations.
///
/// The GCP project comes from [`with_project`](BigQueryConnector::with_project)
/// or the `project_id` key of `BIGQUERY_CREDENTIALS_PASSWORD`.
///
/// # Example
///
/// ```rust,ignore
/// let mut bq = BigQueryConnector::new(store);
/// let rows = bq.query("SELECT name, total FROM dataset.table LIMIT 10").await?;
/// bq.insert_rows("dataset.table", &[json!({"name": "x", "total": 1})]).await?;
/// ```
pub struct BigQueryConnector {
    credentials: CredentialStore,
    api_base: String,
    token_url: String,
    retry: RetryPolicy,
    project_override: Option<String>,
    project_id: Option<String>,
    client: Option<RestClient>,
}

impl BigQueryConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            retry: RetryPolicy::google(),
            project_override: None,
            project_id: None,
            client: None,
        }
    }

    /// Use this GCP project instead of the one in the credentials.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_override = Some(project_id.into());
        self
    }

    /// Point the connector at different API and token endpoints (tests).
    pub fn with_base_urls(
        mut self,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.token_url = token_url.into();
        self
    }

    /// Replace the default retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The resolved GCP project id, available once connected.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    async fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.client.is_none() {
            self.connect().await?;
        }
        Ok(())
    }

    async fn client(&mut self) -> Result<&mut RestClient, Error> {
        self.ensure_connected().await?;
        self.client.as_mut().ok_or_else(|| disconnected(SERVICE))
    }

    fn project(&self) -> Result<String, Error> {
        self.project_id
            .clone()
            .ok_or_else(|| disconnected(SERVICE))
    }

    async fn run_query_job(&mut self, sql: &str) -> Result<Value, Error> {
        self.ensure_connected().await?;
        let project = self.project()?;
        let body = json!({ "query": sql, "useLegacySql": false });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/projects/{project}/queries"),
                &[],
                Some(&body),
            )
            .await?;
        let response = result.unwrap_or_else(|| json!({}));
        if let Some(errors) = response.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(Error::QueryFailure {
                    message: format_proto_errors(errors),
                });
            }
        }
        Ok(response)
    }

    /// Execute a SQL query, returning rows as objects keyed by column name.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Value>, Error> {
        tracing::debug!(query = sql.get(..100).unwrap_or(sql), "executing query");
        let response = self.run_query_job(sql).await?;
        let rows = rows_as_objects(&response);
        tracing::debug!(rows = rows.len(), "query completed");
        Ok(rows)
    }

    /// Execute a DML statement (UPDATE, DELETE, ...), returning the number
    /// of affected rows.
    pub async fn execute_dml(&mut self, sql: &str) -> Result<u64, Error> {
        tracing::debug!(statement = sql.get(..100).unwrap_or(sql), "executing DML");
        let response = self.run_query_job(sql).await?;
        let rows_affected = response
            .get("numDmlAffectedRows")
            .and_then(Value::as_str)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        tracing::info!(rows_affected, "DML completed");
        Ok(rows_affected)
    }

    /// Insert rows into a table with the streaming insert API.
    ///
    /// `table_id` is `dataset.table` or `project.dataset.table`.
    pub async fn insert_rows(&mut self, table_id: &str, rows: &[Value]) -> Result<(), Error> {
        self.ensure_connected().await?;
        let (project, dataset, table) = self.split_table_id(table_id)?;
        let body = json!({
            "rows": rows.iter().map(|row| json!({ "json": row })).collect::<Vec<_>>(),
        });
        let result = self
            .client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/projects/{project}/datasets/{dataset}/tables/{table}/insertAll"),
                &[],
                Some(&body),
            )
            .await?;
        let response = result.unwrap_or_else(|| json!({}));
        if let Some(errors) = response.get("insertErrors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(Error::WriteFailure {
                    message: format!("insert failed with errors: {}", Value::from(errors.clone())),
                });
            }
        }
        tracing::info!(rows = rows.len(), table = table_id, "rows inserted");
        Ok(())
    }

    /// Whether a table exists. Lookup failures read as "no".
    pub async fn table_exists(&mut self, table_id: &str) -> Result<bool, Error> {
        self.ensure_connected().await?;
        let (project, dataset, table) = self.split_table_id(table_id)?;
        let path = format!("/projects/{project}/datasets/{dataset}/tables/{table}");
        let exists = self
            .client()
            .await?
            .request(Method::GET, &path, &[], None)
            .await
            .is_ok();
        Ok(exists)
    }

    /// Split `dataset.table` / `project.dataset.table`, defaulting the
    /// project to the connector's.
    fn split_table_id(&self, table_id: &str) -> Result<(String, String, String), Error> {
        let parts: Vec<&str> = table_id.split('.').collect();
        match parts.as_slice() {
            [dataset, table] => Ok((
                self.project()?,
                dataset.to_string(),
                table.to_string(),
            )),
            [project, dataset, table] => Ok((
                project.to_string(),
                dataset.to_string(),
                table.to_string(),
            )),
            _ => Err(Error::WriteFailure {
                message: format!(
                    "invalid table id '{table_id}': expected 'dataset.table' or 'project.dataset.table'"
                ),
            }),
        }
    }
}

/// Convert the REST query response (`schema.fields` + `rows[].f[].v`) into
/// objects keyed by column name.
fn rows_as_objects(response: &Value) -> Vec<Value> {
    let field_names: Vec<&str> = response
        .get("schema")
        .and_then(|schema| schema.get("fields"))
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|field| field.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let rows = match response.get("rows").and_then(Value::as_array) {
        Some(rows) => rows,
        None => return Vec::new(),
    };

    rows.iter()
        .map(|row| {
            let cells = row.get("f").and_then(Value::as_array);
            let mut object = Map::new();
            if let Some(cells) = cells {
                for (name, cell) in field_names.iter().zip(cells) {
                    let value = cell.get("v").cloned().unwrap_or(Value::Null);
                    object.insert((*name).to_string(), value);
                }
            }
            Value::Object(object)
        })
        .collect()
}

fn format_proto_errors(errors: &[Value]) -> String {
    let messages: Vec<String> = errors
        .iter()
        .map(|error| {
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string())
        })
        .collect();
    messages.join("; ")
}

#[async_trait]
impl Connection for BigQueryConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let credentials = self.credentials.bigquery_credentials()?;
        let project = self
            .project_override
            .clone()
            .or_else(|| credentials.project_id.clone())
            .ok_or_else(|| Error::MissingCredentialField {
                var: "BIGQUERY_CREDENTIALS_PASSWORD".to_string(),
                fields: vec!["project_id".to_string()],
            })?;
        let exchange = GoogleTokenExchange::new("BigQuery", self.token_url.clone(), credentials);
        let mut client = RestClient::new(
            "BigQuery",
            self.api_base.clone(),
            Auth::OAuth(OAuthSession::new(Box::new(exchange))),
            self.retry.clone(),
        )?;
        client.prime_auth().await?;
        self.client = Some(client);
        self.project_id = Some(project.clone());
        tracing::info!(project, "connected to BigQuery");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        self.project_id = None;
        tracing::debug!("disconnected from BigQuery");
    }

    async fn health_check(&mut self) -> bool {
        self.client.is_some()
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_convert_to_objects() {
        let response = json!({
            "schema": { "fields": [{ "name": "name" }, { "name": "total" }] },
            "rows": [
                { "f": [{ "v": "alice" }, { "v": "3" }] },
                { "f": [{ "v": "bob" }, { "v": "5" }] },
            ],
        });
        let rows = rows_as_objects(&response);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "alice");
        assert_eq!(rows[1]["total"], "5");
    }

    #[test]
    fn no_rows_yields_empty() {
        let response = json!({ "schema": { "fields": [{ "name": "n" }] }, "jobComplete": true });
        assert!(rows_as_objects(&response).is_empty());
    }
}
