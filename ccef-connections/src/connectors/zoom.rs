//! Zoom connector.
//!
//! Access to the Zoom API v2 for meeting and webinar data, with a focus on
//! pulling attendee/participant lists from large events. Uses
//! Server-to-Server OAuth.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::core::connection::Connection;
use crate::core::credentials::{CredentialStore, ZoomCredentials};
use crate::core::http::{
    disconnected, token_from_response, Auth, BearerToken, OAuthSession, RestClient, TokenExchange,
};
use crate::core::pagination::PageStyle;
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "Zoom";
const API_BASE: &str = "https://api.zoom.us/v2";
const TOKEN_URL: &str = "https://zoom.us/oauth/token";

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const RATE_LIMIT_DEFAULT_SECS: u64 = 10;
const PAGE_STYLE: PageStyle = PageStyle::PageToken {
    param: "next_page_token",
    field: "next_page_token",
    size: ("page_size", 300),
};

struct ZoomTokenExchange {
    token_url: String,
    credentials: ZoomCredentials,
}

#[async_trait]
impl TokenExchange for ZoomTokenExchange {
    async fn exchange(&self, http: &reqwest::Client) -> Result<BearerToken, Error> {
        let form = [
            ("grant_type", "account_credentials"),
            ("account_id", self.credentials.account_id.as_str()),
        ];
        let response = http
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, "failed to reach token endpoint", e))?;
        token_from_response(SERVICE, response, DEFAULT_TOKEN_TTL_SECS).await
    }
}

/// Zoom connector for meeting and webinar attendee retrieval.
///
/// Credentials are stored as JSON in the `ZOOM_CREDENTIALS_PASSWORD` env
/// var: `{"account_id": "...", "client_id": "...", "client_secret": "..."}`.
pub struct ZoomConnector {
    credentials: CredentialStore,
    api_base: String,
    token_url: String,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl ZoomConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            retry: RetryPolicy::zoom(),
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

    // -- Users ----------------------------------------------------------------

    /// Get a user's profile. `user_id` may be an id, an email, or `me`.
    pub async fn get_user(&mut self, user_id: &str) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::GET, &format!("/users/{user_id}"), &[], None)
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    // -- Meetings -------------------------------------------------------------

    /// List meetings for a user. `meeting_type` is one of `scheduled`,
    /// `live`, `upcoming`, `upcoming_meetings`, `previous_meetings`.
    pub async fn list_meetings(
        &mut self,
        user_id: &str,
        meeting_type: &str,
    ) -> Result<Vec<Value>, Error> {
        let params = vec![("type".to_string(), meeting_type.to_string())];
        self.client()
            .await?
            .paginate_retry(
                &format!("/users/{user_id}/meetings"),
                "meetings",
                &params,
                &PAGE_STYLE,
            )
            .await
    }

    /// Get details for a meeting.
    pub async fn get_meeting(&mut self, meeting_id: u64) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::GET, &format!("/meetings/{meeting_id}"), &[], None)
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Participants from a past meeting via the reports API. The primary
    /// method for pulling attendee lists from completed meetings.
    pub async fn get_past_meeting_participants(
        &mut self,
        meeting_id: &str,
    ) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry(
                &format!("/report/meetings/{meeting_id}/participants"),
                "participants",
                &[],
                &PAGE_STYLE,
            )
            .await
    }

    /// Registrants for a meeting (when registration is enabled). `status`
    /// is `pending`, `approved`, or `denied`.
    pub async fn get_meeting_registrants(
        &mut self,
        meeting_id: u64,
        status: &str,
    ) -> Result<Vec<Value>, Error> {
        let params = vec![("status".to_string(), status.to_string())];
        self.client()
            .await?
            .paginate_retry(
                &format!("/meetings/{meeting_id}/registrants"),
                "registrants",
                &params,
                &PAGE_STYLE,
            )
            .await
    }

    // -- Webinars -------------------------------------------------------------

    /// List webinars for a user.
    pub async fn list_webinars(&mut self, user_id: &str) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry(
                &format!("/users/{user_id}/webinars"),
                "webinars",
                &[],
                &PAGE_STYLE,
            )
            .await
    }

    /// Get details for a webinar.
    pub async fn get_webinar(&mut self, webinar_id: u64) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::GET, &format!("/webinars/{webinar_id}"), &[], None)
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// Registrants for a webinar. `status` is `pending`, `approved`, or
    /// `denied`.
    pub async fn get_webinar_registrants(
        &mut self,
        webinar_id: u64,
        status: &str,
    ) -> Result<Vec<Value>, Error> {
        let params = vec![("status".to_string(), status.to_string())];
        self.client()
            .await?
            .paginate_retry(
                &format!("/webinars/{webinar_id}/registrants"),
                "registrants",
                &params,
                &PAGE_STYLE,
            )
            .await
    }

    /// Participants from a past webinar via the reports API.
    pub async fn get_past_webinar_participants(
        &mut self,
        webinar_id: &str,
    ) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry(
                &format!("/report/webinars/{webinar_id}/participants"),
                "participants",
                &[],
                &PAGE_STYLE,
            )
            .await
    }

    /// Registrants who did not attend a past webinar.
    pub async fn get_webinar_absentees(&mut self, webinar_id: &str) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry(
                &format!("/past_webinars/{webinar_id}/absentees"),
                "registrants",
                &[],
                &PAGE_STYLE,
            )
            .await
    }
}

#[async_trait]
impl Connection for ZoomConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let credentials = self.credentials.zoom_credentials()?;
        let exchange = ZoomTokenExchange {
            token_url: self.token_url.clone(),
            credentials,
        };
        let mut client = RestClient::new(
            "Zoom",
            self.api_base.clone(),
            Auth::OAuth(OAuthSession::new(Box::new(exchange))),
            self.retry.clone(),
        )?
        .rate_limit_default(RATE_LIMIT_DEFAULT_SECS);
        client.prime_auth().await?;
        self.client = Some(client);
        tracing::info!("connected to Zoom");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from Zoom");
    }

    async fn health_check(&mut self) -> bool {
        match &mut self.client {
            Some(client) => client
                .request(Method::GET, "/users/me", &[], None)
                .await
                .is_ok(),
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}
