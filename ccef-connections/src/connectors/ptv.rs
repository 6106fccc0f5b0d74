//! Protect the Vote (PTV) connector.
//!
//! Read access to shift volunteer signup data, volunteer user records, and
//! shift availability data. All three endpoints return CSV per state,
//! fetched with HTTP Basic auth plus an API-key query parameter.
//!
//! When a state has no data the API returns a JSON error body with HTTP
//! 200 in place of CSV; that is normalized to an empty result.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::core::connection::Connection;
use crate::core::credentials::{CredentialStore, Secret};
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "PTV";
const API_BASE: &str = "https://app.protectthevote.net/api";
const DEFAULT_USERNAME: &str = "colab";

/// The bulk CSV endpoints are slow; they get a longer socket timeout than
/// the JSON connectors.
const CSV_TIMEOUT: Duration = Duration::from_secs(60);

const ENDPOINT_SHIFT_VOLUNTEERS: &str = "shift_volunteers_csv";
const ENDPOINT_USERS: &str = "users_csv";
const ENDPOINT_STATE_SHIFTS: &str = "state_shifts_csv";

/// When a state has no data the API returns this JSON marker instead of
/// CSV.
const NOT_FOUND_MARKER: &str = "\"errors\"";

/// A parsed CSV row keyed by header.
pub type CsvRow = HashMap<String, String>;

/// PTV connector for reading shift and volunteer data.
///
/// Reads `PTV_API_KEY_PASSWORD` from the environment.
///
/// # Example
///
/// ```rust,ignore
/// let mut ptv = PtvConnector::new(store);
/// let signups = ptv.get_shift_volunteers("PA").await?;
/// let volunteers = ptv.get_all_users(&["PA", "GA", "AZ"]).await?;
/// ```
pub struct PtvConnector {
    credentials: CredentialStore,
    api_base: String,
    username: String,
    retry: RetryPolicy,
    api_key: Option<Secret>,
    http: Option<reqwest::Client>,
}

impl PtvConnector {
    /// Create a connector with the standard `colab` Basic-auth username.
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            retry: RetryPolicy::ptv(),
            api_key: None,
            http: None,
        }
    }

    /// Use a different Basic-auth username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
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

    async fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.api_key.is_none() {
            self.connect().await?;
        }
        Ok(())
    }

    /// Fetch raw CSV text for one state from one endpoint. Returns an
    /// empty string when the state has no data.
    async fn fetch_csv(&mut self, endpoint: &str, state_code: &str) -> Result<String, Error> {
        let (http, api_key) = match (&self.http, &self.api_key) {
            (Some(http), Some(api_key)) => (http, api_key),
            _ => return Err(Error::connection(SERVICE, "not connected")),
        };

        let url = format!("{}/{endpoint}", self.api_base);
        let response = http
            .get(&url)
            .query(&[("key", api_key.expose()), ("state_code", state_code)])
            .basic_auth(&self.username, Some(api_key.expose()))
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, "API request failed", e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthenticationFailure {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1);
            return Err(Error::RateLimitExceeded {
                service: SERVICE.to_string(),
                retry_after,
            });
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RequestFailure {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(SERVICE, "failed to read response body", e))?;

        if text.contains(NOT_FOUND_MARKER) {
            tracing::debug!(state = state_code, endpoint, "no data for state");
            return Ok(String::new());
        }
        Ok(text)
    }

    async fn fetch_rows(
        &mut self,
        endpoint: &str,
        state_code: &str,
        label: &str,
    ) -> Result<Vec<CsvRow>, Error> {
        self.ensure_connected().await?;
        let mut attempts = self.retry.attempts();
        let text = loop {
            match self.fetch_csv(endpoint, state_code).await {
                Ok(text) => break text,
                Err(err) => attempts.backoff(err).await?,
            }
        };
        let rows = parse_csv(&text)?;
        tracing::info!(endpoint = label, state = state_code, rows = rows.len(), "fetched rows");
        Ok(rows)
    }

    async fn collect_all(
        &mut self,
        endpoint: &str,
        state_codes: &[&str],
        label: &str,
    ) -> Result<Vec<CsvRow>, Error> {
        let mut all_rows = Vec::new();
        let total = state_codes.len();
        for (done, state_code) in state_codes.iter().enumerate() {
            let mut rows = self.fetch_rows(endpoint, state_code, label).await?;
            for row in &mut rows {
                row.insert("state".to_string(), state_code.to_string());
            }
            all_rows.extend(rows);
            tracing::info!(
                endpoint = label,
                done = done + 1,
                total,
                collected = all_rows.len(),
                "state complete"
            );
        }
        Ok(all_rows)
    }

    // -- Shift volunteers -----------------------------------------------------

    /// Volunteer signups attached to shifts, for one state.
    pub async fn get_shift_volunteers(&mut self, state_code: &str) -> Result<Vec<CsvRow>, Error> {
        self.fetch_rows(ENDPOINT_SHIFT_VOLUNTEERS, state_code, "shift_volunteers")
            .await
    }

    /// Volunteer signups for multiple states, with a `state` column added.
    pub async fn get_all_shift_volunteers(
        &mut self,
        state_codes: &[&str],
    ) -> Result<Vec<CsvRow>, Error> {
        self.collect_all(ENDPOINT_SHIFT_VOLUNTEERS, state_codes, "shift_volunteers")
            .await
    }

    // -- Users ----------------------------------------------------------------

    /// All registered volunteers for one state.
    pub async fn get_users(&mut self, state_code: &str) -> Result<Vec<CsvRow>, Error> {
        self.fetch_rows(ENDPOINT_USERS, state_code, "users").await
    }

    /// All registered volunteers for multiple states, with a `state`
    /// column added.
    pub async fn get_all_users(&mut self, state_codes: &[&str]) -> Result<Vec<CsvRow>, Error> {
        self.collect_all(ENDPOINT_USERS, state_codes, "users").await
    }

    // -- State shifts ---------------------------------------------------------

    /// All shifts with volunteer counts and fill rates, for one state.
    pub async fn get_state_shifts(&mut self, state_code: &str) -> Result<Vec<CsvRow>, Error> {
        self.fetch_rows(ENDPOINT_STATE_SHIFTS, state_code, "state_shifts")
            .await
    }

    /// All shifts for multiple states, with a `state` column added.
    pub async fn get_all_state_shifts(
        &mut self,
        state_codes: &[&str],
    ) -> Result<Vec<CsvRow>, Error> {
        self.collect_all(ENDPOINT_STATE_SHIFTS, state_codes, "state_shifts")
            .await
    }
}

/// Parse CSV text into rows keyed by header. Empty input parses to no
/// rows.
fn parse_csv(text: &str) -> Result<Vec<CsvRow>, Error> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| Error::transport(SERVICE, "invalid CSV header", e))?
        .clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::transport(SERVICE, "invalid CSV row", e))?;
        let row: CsvRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.to_string(), value.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[async_trait]
impl Connection for PtvConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let api_key = self.credentials.ptv_api_key()?;
        let http = reqwest::Client::builder()
            .timeout(CSV_TIMEOUT)
            .build()
            .map_err(|e| Error::transport(SERVICE, "failed to build HTTP client", e))?;
        self.api_key = Some(api_key);
        self.http = Some(http);
        tracing::info!("connected to PTV");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.api_key = None;
        self.http = None;
        tracing::debug!("disconnected from PTV");
    }

    async fn health_check(&mut self) -> bool {
        self.api_key.is_some()
    }

    fn is_connected(&self) -> bool {
        self.api_key.is_some()
    }
}
