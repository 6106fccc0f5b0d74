//! Google OAuth2 token exchange shared by the Sheets and BigQuery
//! connectors.
//!
//! Authorized-user credentials (`client_id`/`client_secret`/`refresh_token`)
//! are exchanged for a bearer token with the standard `refresh_token` grant
//! against Google's token endpoint.

use async_trait::async_trait;

use crate::core::credentials::GoogleCredentials;
use crate::core::http::{token_from_response, BearerToken, TokenExchange};
use crate::error::Error;

pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google access tokens live for an hour.
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

pub(crate) struct GoogleTokenExchange {
    service: &'static str,
    token_url: String,
    credentials: GoogleCredentials,
}

impl GoogleTokenExchange {
    pub(crate) fn new(
        service: &'static str,
        token_url: impl Into<String>,
        credentials: GoogleCredentials,
    ) -> Self {
        Self {
            service,
            token_url: token_url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl TokenExchange for GoogleTokenExchange {
    async fn exchange(&self, http: &reqwest::Client) -> Result<BearerToken, Error> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose()),
            ("refresh_token", self.credentials.refresh_token.expose()),
        ];
        let response = http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::transport(self.service, "failed to reach token endpoint", e))?;
        token_from_response(self.service, response, DEFAULT_TOKEN_TTL_SECS).await
    }
}
