//! HelpScout connector.
//!
//! Automated email processing via the HelpScout API v2: read conversations
//! from shared inboxes, extract message threads, reply, add notes, forward,
//! and close/resolve conversations. Uses the OAuth2 client-credentials
//! flow.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::core::connection::Connection;
use crate::core::credentials::{CredentialStore, Secret};
use crate::core::http::{
    disconnected, token_from_response, Auth, BearerToken, OAuthSession, RestClient, TokenExchange,
};
use crate::core::pagination::PageStyle;
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "HelpScout";
const API_BASE: &str = "https://api.helpscout.net/v2";
const TOKEN_URL: &str = "https://api.helpscout.net/v2/oauth2/token";

/// HelpScout tokens last two days.
const DEFAULT_TOKEN_TTL_SECS: i64 = 172_800;
const RATE_LIMIT_DEFAULT_SECS: u64 = 10;
const PAGE_STYLE: PageStyle = PageStyle::NextLink;

/// Conversation statuses accepted by the HelpScout API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    Active,
    Pending,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Pending => "pending",
            ConversationStatus::Closed => "closed",
        }
    }
}

struct HelpScoutTokenExchange {
    token_url: String,
    app_id: String,
    app_secret: Secret,
}

#[async_trait]
impl TokenExchange for HelpScoutTokenExchange {
    async fn exchange(&self, http: &reqwest::Client) -> Result<BearerToken, Error> {
        let response = http
            .post(&self.token_url)
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": self.app_id,
                "client_secret": self.app_secret.expose(),
            }))
            .send()
            .await
            .map_err(|e| Error::transport(SERVICE, "failed to reach token endpoint", e))?;
        token_from_response("HelpScout", response, DEFAULT_TOKEN_TTL_SECS).await
    }
}

/// HelpScout connector for automated email processing.
///
/// # Example
///
/// ```rust,ignore
/// let mut helpscout = HelpScoutConnector::new(store);
/// let mailboxes = helpscout.list_mailboxes().await?;
/// let open = helpscout
///     .list_conversations(mailboxes[0]["id"].as_u64().unwrap(), Some("active"), None)
///     .await?;
/// ```
pub struct HelpScoutConnector {
    credentials: CredentialStore,
    api_base: String,
    token_url: String,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl HelpScoutConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            retry: RetryPolicy::helpscout(),
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

    // -- Mailboxes ------------------------------------------------------------

    /// List all mailboxes visible to the app.
    pub async fn list_mailboxes(&mut self) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry("/mailboxes", "mailboxes", &[], &PAGE_STYLE)
            .await
    }

    // -- Conversations (read) -------------------------------------------------

    /// List conversations in a mailbox, optionally filtered by status
    /// (`active`, `pending`, `closed`, `all`) and tag.
    pub async fn list_conversations(
        &mut self,
        mailbox_id: u64,
        status: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<Value>, Error> {
        let mut params = vec![("mailbox".to_string(), mailbox_id.to_string())];
        if let Some(status) = status {
            params.push(("status".to_string(), status.to_string()));
        }
        if let Some(tag) = tag {
            params.push(("tag".to_string(), tag.to_string()));
        }
        self.client()
            .await?
            .paginate_retry("/conversations", "conversations", &params, &PAGE_STYLE)
            .await
    }

    /// Get a single conversation with full details.
    pub async fn get_conversation(&mut self, conversation_id: u64) -> Result<Value, Error> {
        let result = self
            .client()
            .await?
            .request_retry(
                Method::GET,
                &format!("/conversations/{conversation_id}"),
                &[],
                None,
            )
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// List all threads (messages) in a conversation.
    pub async fn list_threads(&mut self, conversation_id: u64) -> Result<Vec<Value>, Error> {
        self.client()
            .await?
            .paginate_retry(
                &format!("/conversations/{conversation_id}/threads"),
                "threads",
                &[],
                &PAGE_STYLE,
            )
            .await
    }

    // -- Conversations (write) ------------------------------------------------

    /// Reply to a conversation. `customer` defaults to the conversation's
    /// customer when not given; `draft` saves without sending.
    pub async fn reply_to_conversation(
        &mut self,
        conversation_id: u64,
        text: &str,
        customer: Option<Value>,
        draft: bool,
    ) -> Result<(), Error> {
        let mut body = json!({ "text": text, "draft": draft });
        if let Some(customer) = customer {
            body["customer"] = customer;
        }
        self.client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/conversations/{conversation_id}/reply"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(())
    }

    /// Add an internal note to a conversation.
    pub async fn add_note(&mut self, conversation_id: u64, text: &str) -> Result<(), Error> {
        let body = json!({ "text": text });
        self.client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/conversations/{conversation_id}/notes"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(())
    }

    /// Update the status of a conversation.
    pub async fn update_conversation_status(
        &mut self,
        conversation_id: u64,
        status: ConversationStatus,
    ) -> Result<(), Error> {
        let body = json!({
            "op": "replace",
            "path": "/status",
            "value": status.as_str(),
        });
        self.client()
            .await?
            .request_retry(
                Method::PUT,
                &format!("/conversations/{conversation_id}"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(())
    }

    /// Forward a conversation to external email addresses.
    pub async fn forward_conversation(
        &mut self,
        conversation_id: u64,
        to: &[String],
        note: Option<&str>,
    ) -> Result<(), Error> {
        let mut body = json!({ "to": to });
        if let Some(note) = note {
            body["text"] = json!(note);
        }
        self.client()
            .await?
            .request_retry(
                Method::POST,
                &format!("/conversations/{conversation_id}/forward"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for HelpScoutConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let creds = self.credentials.helpscout_credentials()?;
        let exchange = HelpScoutTokenExchange {
            token_url: self.token_url.clone(),
            app_id: creds.app_id,
            app_secret: creds.app_secret,
        };
        let mut client = RestClient::new(
            "HelpScout",
            self.api_base.clone(),
            Auth::OAuth(OAuthSession::new(Box::new(exchange))),
            self.retry.clone(),
        )?
        .rate_limit_default(RATE_LIMIT_DEFAULT_SECS);
        client.prime_auth().await?;
        self.client = Some(client);
        tracing::info!("connected to HelpScout");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from HelpScout");
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
