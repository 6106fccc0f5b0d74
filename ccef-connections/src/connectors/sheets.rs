//! Google Sheets connector.
//!
//! READ-ONLY access to Google Sheets for configuration management and data
//! retrieval, via the Sheets REST API v4 with Google OAuth credentials.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::connectors::google::{GoogleTokenExchange, GOOGLE_TOKEN_URL};
use crate::core::connection::Connection;
use crate::core::credentials::CredentialStore;
use crate::core::http::{disconnected, Auth, OAuthSession, RestClient};
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "Google Sheets";
const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Sheets connector with read-only spreadsheet access.
///
/// # Example
///
/// ```rust,ignore
/// let mut sheets = SheetsConnector::new(store);
/// let rows = sheets.get_worksheet_as_dicts("1ABC...", "Config", 0).await?;
/// for row in &rows {
///     println!("{} / {}", row["Section"], row["Key"]);
/// }
/// ```
pub struct SheetsConnector {
    credentials: CredentialStore,
    api_base: String,
    token_url: String,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl SheetsConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            retry: RetryPolicy::google(),
            client: None,
        }
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

    async fn client(&mut self) -> Result<&mut RestClient, Error> {
        if self.client.is_none() {
            self.connect().await?;
        }
        self.client.as_mut().ok_or_else(|| disconnected(SERVICE))
    }

    /// Spreadsheet metadata (title, worksheets, ...).
    pub async fn get_spreadsheet(&mut self, spreadsheet_id: &str) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::GET, &format!("/{spreadsheet_id}"), &[], None)
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Values from a range in A1 notation (e.g. `Sheet1!A1:B10`).
    pub async fn get_range(
        &mut self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, Error> {
        let result = self
            .client()
            .await?
            .request_retry(
                Method::GET,
                &format!("/{spreadsheet_id}/values/{range}"),
                &[],
                None,
            )
            .await?;
        Ok(result.as_ref().map(value_grid).unwrap_or_default())
    }

    /// All values from a worksheet (an A1 range of just the sheet name).
    pub async fn get_all_values(
        &mut self,
        spreadsheet_id: &str,
        worksheet_name: &str,
    ) -> Result<Vec<Vec<String>>, Error> {
        self.get_range(spreadsheet_id, worksheet_name).await
    }

    /// Values from a range as dictionaries, using `header_row` (0-based)
    /// as the keys. Short rows are padded with empty strings.
    pub async fn get_range_as_dicts(
        &mut self,
        spreadsheet_id: &str,
        range: &str,
        header_row: usize,
    ) -> Result<Vec<HashMap<String, String>>, Error> {
        let data = self.get_range(spreadsheet_id, range).await?;
        Ok(rows_to_dicts(data, header_row))
    }

    /// All values from a worksheet as dictionaries.
    pub async fn get_worksheet_as_dicts(
        &mut self,
        spreadsheet_id: &str,
        worksheet_name: &str,
        header_row: usize,
    ) -> Result<Vec<HashMap<String, String>>, Error> {
        let data = self.get_all_values(spreadsheet_id, worksheet_name).await?;
        Ok(rows_to_dicts(data, header_row))
    }
}

fn value_grid(data: &Value) -> Vec<Vec<String>> {
    let rows = match data.get("values").and_then(Value::as_array) {
        Some(rows) => rows,
        None => return Vec::new(),
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell_text).collect())
                .unwrap_or_default()
        })
        .collect()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn rows_to_dicts(data: Vec<Vec<String>>, header_row: usize) -> Vec<HashMap<String, String>> {
    if data.len() <= header_row {
        return Vec::new();
    }
    let headers = data[header_row].clone();
    data.into_iter()
        .skip(header_row + 1)
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = row.get(i).cloned().unwrap_or_default();
                    (header.clone(), value)
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl Connection for SheetsConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let credentials = self.credentials.google_sheets_credentials()?;
        let exchange =
            GoogleTokenExchange::new("Google Sheets", self.token_url.clone(), credentials);
        let mut client = RestClient::new(
            "Google Sheets",
            self.api_base.clone(),
            Auth::OAuth(OAuthSession::new(Box::new(exchange))),
            self.retry.clone(),
        )?;
        client.prime_auth().await?;
        self.client = Some(client);
        tracing::info!("connected to Google Sheets");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from Google Sheets");
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
    fn grid_handles_mixed_cells() {
        let data = json!({ "values": [["a", 1, true], ["b"]] });
        let grid = value_grid(&data);
        assert_eq!(grid, vec![vec!["a", "1", "true"], vec!["b"]]);
    }

    #[test]
    fn dict_rows_pad_short_rows() {
        let data = vec![
            vec!["Section".to_string(), "Key".to_string(), "Value".to_string()],
            vec!["airtable".to_string(), "base_id".to_string()],
        ];
        let dicts = rows_to_dicts(data, 0);
        assert_eq!(dicts.len(), 1);
        assert_eq!(dicts[0]["Section"], "airtable");
        assert_eq!(dicts[0]["Value"], "");
    }

    #[test]
    fn dict_rows_empty_when_only_headers() {
        let data = vec![vec!["Section".to_string()]];
        assert!(rows_to_dicts(data, 0).is_empty());
    }
}
