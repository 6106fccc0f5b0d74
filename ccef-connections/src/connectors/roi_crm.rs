//! ROI CRM connector.
//!
//! Access to the ROI CRM API v1.0 for managing donors, donations, pledges,
//! payment tokens, and related fundraising data. Uses OAuth2 client
//! credentials via Auth0.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::core::connection::Connection;
use crate::core::credentials::{CredentialStore, RoiCrmCredentials};
use crate::core::http::{
    disconnected, token_from_response, Auth, BearerToken, OAuthSession, RestClient, TokenExchange,
};
use crate::core::pagination::PageStyle;
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "ROI CRM";
const API_BASE: &str = "https://app.roicrm.net/api/1.0";
const TOKEN_URL: &str = "https://roisolutions.us.auth0.com/oauth/token";

/// ROI tokens are valid for 24 hours.
const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400;
const RATE_LIMIT_DEFAULT_SECS: u64 = 30;
const PAGE_STYLE: PageStyle = PageStyle::ItemsNext { per_page: 100 };

struct RoiTokenExchange {
    token_url: String,
    credentials: RoiCrmCredentials,
}

#[async_trait]
impl TokenExchange for RoiTokenExchange {
    async fn exchange(&self, http: &reqwest::Client) -> Result<BearerToken, Error> {
        let response = http
            .post(&self.token_url)
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": self.credentials.client_id,
                "client_secret": self.credentials.client_secret.expose(),
                "audience": self.credentials.audience,
                "roi_client_code": self.credentials.roi_client_code,
            }))
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, "failed to reach token endpoint", e))?;
        token_from_response(SERVICE, response, DEFAULT_TOKEN_TTL_SECS).await
    }
}

/// ROI CRM connector for donor and fundraising data management.
///
/// Credentials are stored as JSON in `ROI_CRM_CREDENTIALS_PASSWORD`:
/// `{"client_id": "...", "client_secret": "...", "audience": "...",
/// "roi_client_code": "..."}`.
pub struct RoiCrmConnector {
    credentials: CredentialStore,
    api_base: String,
    token_url: String,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl RoiCrmConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            retry: RetryPolicy::roi_crm(),
            client: None,
        }
    }

    /// Point the connector at different API and token endpoints (staging,
    /// tests).
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

    async fn get_one(&mut self, path: &str) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::GET, path, &[], None)
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    async fn post_one(&mut self, path: &str, body: &Value) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::POST, path, &[], Some(body))
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    async fn patch_one(&mut self, path: &str, body: &Value) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::PATCH, path, &[], Some(body))
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    async fn list(
        &mut self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry(path, "items", params, &PAGE_STYLE)
            .await
    }

    // -- System ---------------------------------------------------------------

    /// Ping the API to verify connectivity.
    pub async fn ping(&mut self) -> Result<Value, Error> {
        self.get_one("/ping/").await
    }

    /// Current server time.
    pub async fn get_server_time(&mut self) -> Result<Value, Error> {
        self.get_one("/server-time/").await
    }

    // -- Donors ---------------------------------------------------------------

    /// Search donors. `filters` are query params such as `last_name`,
    /// `email`, `zip`.
    pub async fn search_donors(
        &mut self,
        filters: &[(String, String)],
    ) -> Result<Vec<Value>, Error> {
        self.list("/donors/", filters).await
    }

    /// Get a donor record by id.
    pub async fn get_donor(&mut self, donor_id: u64) -> Result<Value, Error> {
        self.get_one(&format!("/donors/{donor_id}/")).await
    }

    /// Create a new donor record.
    pub async fn create_donor(&mut self, fields: &Value) -> Result<Value, Error> {
        self.post_one("/donors/", fields).await
    }

    /// Update an existing donor record.
    pub async fn update_donor(&mut self, donor_id: u64, fields: &Value) -> Result<Value, Error> {
        self.patch_one(&format!("/donors/{donor_id}/"), fields).await
    }

    /// Get a donor's flextable (custom field table) by name.
    pub async fn get_donor_flextable(
        &mut self,
        donor_id: u64,
        table_name: &str,
    ) -> Result<Value, Error> {
        self.get_one(&format!("/donors/{donor_id}/flextables/{table_name}/"))
            .await
    }

    /// Aggregate donation summary for a donor.
    pub async fn get_donation_summary(&mut self, donor_id: u64) -> Result<Value, Error> {
        self.get_one(&format!("/donors/{donor_id}/donations/summary/"))
            .await
    }

    // -- Donations ------------------------------------------------------------

    /// List a donor's donations.
    pub async fn list_donations(
        &mut self,
        donor_id: u64,
        filters: &[(String, String)],
    ) -> Result<Vec<Value>, Error> {
        self.list(&format!("/donors/{donor_id}/donations/"), filters)
            .await
    }

    /// Get a single donation transaction.
    pub async fn get_donation(&mut self, donor_id: u64, txn_id: u64) -> Result<Value, Error> {
        self.get_one(&format!("/donors/{donor_id}/donations/{txn_id}/"))
            .await
    }

    /// Record a donation for a donor.
    pub async fn create_donation(&mut self, donor_id: u64, fields: &Value) -> Result<Value, Error> {
        self.post_one(&format!("/donors/{donor_id}/donations/"), fields)
            .await
    }

    /// Transactions related to a donation (refunds, adjustments).
    pub async fn get_related_transactions(
        &mut self,
        donor_id: u64,
        txn_id: u64,
    ) -> Result<Vec<Value>, Error> {
        self.list(
            &format!("/donors/{donor_id}/donations/{txn_id}/related/"),
            &[],
        )
        .await
    }

    // -- Pledges --------------------------------------------------------------

    /// List a donor's pledges.
    pub async fn list_pledges(
        &mut self,
        donor_id: u64,
        filters: &[(String, String)],
    ) -> Result<Vec<Value>, Error> {
        self.list(&format!("/donors/{donor_id}/pledges/"), filters)
            .await
    }

    /// Get a single pledge.
    pub async fn get_pledge(&mut self, donor_id: u64, pledge_id: u64) -> Result<Value, Error> {
        self.get_one(&format!("/donors/{donor_id}/pledges/{pledge_id}/"))
            .await
    }

    /// Create a pledge for a donor.
    pub async fn create_pledge(&mut self, donor_id: u64, fields: &Value) -> Result<Value, Error> {
        self.post_one(&format!("/donors/{donor_id}/pledges/"), fields)
            .await
    }

    /// Update an existing pledge.
    pub async fn update_pledge(
        &mut self,
        donor_id: u64,
        pledge_id: u64,
        fields: &Value,
    ) -> Result<Value, Error> {
        self.patch_one(&format!("/donors/{donor_id}/pledges/{pledge_id}/"), fields)
            .await
    }

    // -- Payment tokens -------------------------------------------------------

    /// List a donor's stored payment tokens.
    pub async fn list_payment_tokens(&mut self, donor_id: u64) -> Result<Vec<Value>, Error> {
        self.list(&format!("/donors/{donor_id}/payment-tokens/"), &[])
            .await
    }

    /// Get a single payment token.
    pub async fn get_payment_token(
        &mut self,
        donor_id: u64,
        token_id: u64,
    ) -> Result<Value, Error> {
        self.get_one(&format!("/donors/{donor_id}/payment-tokens/{token_id}/"))
            .await
    }

    /// Store a payment token for a donor.
    pub async fn create_payment_token(
        &mut self,
        donor_id: u64,
        fields: &Value,
    ) -> Result<Value, Error> {
        self.post_one(&format!("/donors/{donor_id}/payment-tokens/"), fields)
            .await
    }

    // -- Contact info ---------------------------------------------------------

    /// A donor's primary address.
    pub async fn get_primary_address(&mut self, donor_id: u64) -> Result<Value, Error> {
        self.get_one(&format!("/donors/{donor_id}/primary-address/"))
            .await
    }

    /// A donor's non-primary addresses.
    pub async fn list_other_addresses(&mut self, donor_id: u64) -> Result<Vec<Value>, Error> {
        self.list(&format!("/donors/{donor_id}/addresses/"), &[]).await
    }

    /// A donor's email addresses.
    pub async fn list_emails(&mut self, donor_id: u64) -> Result<Vec<Value>, Error> {
        self.list(&format!("/donors/{donor_id}/emails/"), &[]).await
    }

    /// A donor's phone numbers.
    pub async fn list_phones(&mut self, donor_id: u64) -> Result<Vec<Value>, Error> {
        self.list(&format!("/donors/{donor_id}/phones/"), &[]).await
    }

    // -- Comments -------------------------------------------------------------

    /// List comments on a donor record.
    pub async fn list_comments(&mut self, donor_id: u64) -> Result<Vec<Value>, Error> {
        self.list(&format!("/donors/{donor_id}/comments/"), &[]).await
    }

    /// Add a comment to a donor record.
    pub async fn add_comment(&mut self, donor_id: u64, fields: &Value) -> Result<Value, Error> {
        self.post_one(&format!("/donors/{donor_id}/comments/"), fields)
            .await
    }
}

#[async_trait]
impl Connection for RoiCrmConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let credentials = self.credentials.roi_crm_credentials()?;
        let exchange = RoiTokenExchange {
            token_url: self.token_url.clone(),
            credentials,
        };
        let mut client = RestClient::new(
            "ROI CRM",
            self.api_base.clone(),
            Auth::OAuth(OAuthSession::new(Box::new(exchange))),
            self.retry.clone(),
        )?
        .rate_limit_default(RATE_LIMIT_DEFAULT_SECS);
        client.prime_auth().await?;
        self.client = Some(client);
        tracing::info!("connected to ROI CRM");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from ROI CRM");
    }

    /// Probe the `/ping/` endpoint.
    async fn health_check(&mut self) -> bool {
        match &mut self.client {
            Some(client) => client.request(Method::GET, "/ping/", &[], None).await.is_ok(),
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}
