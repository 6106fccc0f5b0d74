//! Shared HTTP request core for the REST connectors.
//!
//! Every JSON connector drives one [`RestClient`]: it builds the request,
//! attaches auth headers for the connector's strategy, classifies the
//! response status into the error taxonomy, and parses the JSON body.
//! OAuth-backed services get the token refresh state machine
//! ([`OAuthSession`]): proactive refresh before an expired call, and one
//! reactive refresh-plus-retry on an observed 401.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::core::credentials::Secret;
use crate::core::pagination::{self, PageStyle};
use crate::core::retry::RetryPolicy;
use crate::error::Error;

/// Tokens are treated as expired this many seconds before the
/// server-reported expiry, absorbing clock skew and in-flight latency.
const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

/// Default per-request socket timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A bearer token and the instant past which it must not be used.
pub(crate) struct BearerToken {
    access_token: Secret,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Build a token from a server-reported TTL, applying the safety margin.
    pub(crate) fn new(access_token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            access_token: Secret::new(access_token),
            expires_at: Utc::now()
                + chrono::Duration::seconds(expires_in_secs - TOKEN_SAFETY_MARGIN_SECS),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// The service-specific OAuth2 client-credentials exchange.
#[async_trait]
pub(crate) trait TokenExchange: Send + Sync {
    async fn exchange(&self, http: &reqwest::Client) -> Result<BearerToken, Error>;
}

/// Token refresh state machine: `NoToken -> Valid -> Expired -> Valid ...`.
///
/// Expiry is detected lazily when headers are built; `disconnect` on the
/// owning connector drops the whole session, which is the `NoToken` state.
pub(crate) struct OAuthSession {
    exchange: Box<dyn TokenExchange>,
    token: Option<BearerToken>,
}

impl OAuthSession {
    pub(crate) fn new(exchange: Box<dyn TokenExchange>) -> Self {
        Self {
            exchange,
            token: None,
        }
    }

    fn force_expire(&mut self) {
        self.token = None;
    }

    async fn ensure_token(
        &mut self,
        http: &reqwest::Client,
        service: &str,
    ) -> Result<&BearerToken, Error> {
        let needs_refresh = self.token.as_ref().map_or(true, BearerToken::is_expired);
        if needs_refresh {
            tracing::debug!(service, "bearer token missing or expired, fetching");
            self.token = Some(self.exchange.exchange(http).await?);
        }
        match &self.token {
            Some(token) => Ok(token),
            None => Err(Error::connection(service, "no bearer token after refresh")),
        }
    }
}

/// How a connector authenticates its requests.
pub(crate) enum Auth {
    /// No auth headers; the connector handles auth itself.
    None,
    /// Static key sent as `Authorization: Bearer {key}`.
    BearerKey(Secret),
    /// Static key sent verbatim in a custom header (lowercase name).
    HeaderKey {
        header: &'static str,
        key: Secret,
    },
    /// Bearer token managed by the refresh state machine.
    OAuth(OAuthSession),
}

/// The per-connector HTTP request core.
pub(crate) struct RestClient {
    service: &'static str,
    base_url: String,
    http: reqwest::Client,
    auth: Auth,
    retry: RetryPolicy,
    content_type: &'static str,
    rate_limit_default: u64,
}

impl RestClient {
    pub(crate) fn new(
        service: &'static str,
        base_url: impl Into<String>,
        auth: Auth,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        Self::with_timeout(service, base_url, auth, retry, DEFAULT_TIMEOUT)
    }

    pub(crate) fn with_timeout(
        service: &'static str,
        base_url: impl Into<String>,
        auth: Auth,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(service, "failed to build HTTP client", e))?;
        Ok(Self {
            service,
            base_url: base_url.into(),
            http,
            auth,
            retry,
            content_type: "application/json",
            rate_limit_default: 1,
        })
    }

    pub(crate) fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    /// Seconds reported on a 429 when the server sends no `Retry-After`.
    pub(crate) fn rate_limit_default(mut self, secs: u64) -> Self {
        self.rate_limit_default = secs;
        self
    }

    pub(crate) fn service(&self) -> &'static str {
        self.service
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the initial bearer token so `connect()` fails fast on bad
    /// credentials. No-op for static-credential strategies.
    pub(crate) async fn prime_auth(&mut self) -> Result<(), Error> {
        if let Auth::OAuth(session) = &mut self.auth {
            session.ensure_token(&self.http, self.service).await?;
        }
        Ok(())
    }

    fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn auth_headers(&mut self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        match &mut self.auth {
            Auth::None => {}
            Auth::BearerKey(key) => {
                headers.insert(AUTHORIZATION, bearer_value(self.service, key.expose())?);
            }
            Auth::HeaderKey { header, key } => {
                headers.insert(
                    HeaderName::from_static(*header),
                    header_value(self.service, key.expose())?,
                );
            }
            Auth::OAuth(session) => {
                let token = session.ensure_token(&self.http, self.service).await?;
                headers.insert(
                    AUTHORIZATION,
                    bearer_value(self.service, token.access_token.expose())?,
                );
            }
        }
        Ok(headers)
    }

    async fn send(
        &mut self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, Error> {
        let headers = self.auth_headers().await?;
        let mut request = self.http.request(method, url).headers(headers);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| Error::transport(self.service, "API request failed", e))
    }

    /// Issue one request and map the response per the error taxonomy.
    ///
    /// Returns `Ok(None)` for 204 No Content, `Ok(Some(json))` otherwise.
    /// For OAuth-backed clients a 401 force-expires the token and retries
    /// the request exactly once.
    pub(crate) async fn request(
        &mut self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        let url = self.absolute_url(path);
        let mut response = self.send(method.clone(), &url, query, body).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if matches!(self.auth, Auth::OAuth(_)) {
                tracing::debug!(
                    service = self.service,
                    "received 401, refreshing token and retrying"
                );
                if let Auth::OAuth(session) = &mut self.auth {
                    session.force_expire();
                }
                response = self.send(method, &url, query, body).await?;
                if response.status() == StatusCode::UNAUTHORIZED {
                    let body_text = read_body(response).await;
                    return Err(Error::AuthenticationFailure {
                        service: self.service.to_string(),
                        status: 401,
                        body: body_text,
                    });
                }
            } else {
                let body_text = read_body(response).await;
                return Err(Error::AuthenticationFailure {
                    service: self.service.to_string(),
                    status: 401,
                    body: body_text,
                });
            }
        }

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response).unwrap_or(self.rate_limit_default);
            return Err(Error::RateLimitExceeded {
                service: self.service.to_string(),
                retry_after,
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status.is_client_error() || status.is_server_error() {
            let body_text = read_body(response).await;
            return Err(Error::RequestFailure {
                service: self.service.to_string(),
                status: status.as_u16(),
                body: body_text,
            });
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| Error::transport(self.service, "response body is not valid JSON", e))?;
        Ok(Some(value))
    }

    /// [`request`](Self::request) wrapped in the client's retry policy.
    pub(crate) async fn request_retry(
        &mut self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        let mut attempts = self.retry.attempts();
        loop {
            match self.request(method.clone(), path, query, body).await {
                Ok(value) => return Ok(value),
                Err(err) => attempts.backoff(err).await?,
            }
        }
    }

    /// One full pagination pass wrapped in the retry policy. A retry
    /// restarts from the first page; no server-side cursor is persisted.
    pub(crate) async fn paginate_retry(
        &mut self,
        path: &str,
        resource_key: &str,
        params: &[(String, String)],
        style: &PageStyle,
    ) -> Result<Vec<Value>, Error> {
        let mut attempts = self.retry.attempts();
        loop {
            match pagination::paginate(self, path, resource_key, params, style).await {
                Ok(items) => return Ok(items),
                Err(err) => attempts.backoff(err).await?,
            }
        }
    }
}

/// Error returned when a connector method runs without a live client.
/// Unreachable in practice: connectors auto-connect first.
pub(crate) fn disconnected(service: &str) -> Error {
    Error::connection(service, "not connected")
}

pub(crate) async fn read_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("Retry-After")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn bearer_value(service: &str, token: &str) -> Result<HeaderValue, Error> {
    header_value(service, &format!("Bearer {token}"))
}

fn header_value(service: &str, value: &str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|e| Error::transport(service, "credential is not a valid header value", e))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Wire shape of the interesting part of a token-endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// Parse a token-endpoint response into a [`BearerToken`].
///
/// Non-2xx responses are authentication failures; so is a 2xx body missing
/// `access_token`. `expires_in` falls back to the service's documented TTL.
pub(crate) async fn token_from_response(
    service: &'static str,
    response: reqwest::Response,
    default_ttl_secs: i64,
) -> Result<BearerToken, Error> {
    let status = response.status();
    if !status.is_success() {
        let body = read_body(response).await;
        return Err(Error::AuthenticationFailure {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    let data: TokenResponse =
        response
            .json()
            .await
            .map_err(|e| Error::AuthenticationFailure {
                service: service.to_string(),
                status: status.as_u16(),
                body: format!("malformed token response: {e}"),
            })?;
    let expires_in = data.expires_in.unwrap_or(default_ttl_secs);
    tracing::debug!(service, "OAuth token obtained");
    Ok(BearerToken::new(data.access_token, expires_in))
}
