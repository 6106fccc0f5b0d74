//! OpenAI connector.
//!
//! A thin client over the OpenAI REST API with automatic credential
//! management: chat completions, structured (JSON-schema) outputs, and
//! model listing.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::core::connection::Connection;
use crate::core::credentials::CredentialStore;
use crate::core::http::{disconnected, Auth, RestClient};
use crate::core::retry::RetryPolicy;
use crate::error::Error;

const SERVICE: &str = "OpenAI";
const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TEMPERATURE: f64 = 0.1;

/// OpenAI connector for chat completions and structured outputs.
///
/// # Example
///
/// ```rust,ignore
/// let mut openai = OpenAiConnector::new(store);
/// let answer = openai
///     .complete(None, "You are a helpful assistant.", "What is 2+2?", None)
///     .await?;
/// ```
pub struct OpenAiConnector {
    credentials: CredentialStore,
    api_base: String,
    retry: RetryPolicy,
    client: Option<RestClient>,
}

impl OpenAiConnector {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            retry: RetryPolicy::openai(),
            client: None,
        }
    }

    /// Point the connector at a different API base (proxy, tests).
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

    /// Raw chat completion. `messages` is the OpenAI messages array.
    pub async fn chat_completion(
        &mut self,
        model: Option<&str>,
        messages: Value,
        temperature: Option<f64>,
    ) -> Result<Value, Error> {
        let body = json!({
            "model": model.unwrap_or(DEFAULT_MODEL),
            "messages": messages,
            "temperature": temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });
        let result = self
            .client()
            .await?
            .request_retry(Method::POST, "/chat/completions", &[], Some(&body))
            .await?;
        Ok(result.unwrap_or_else(|| json!({})))
    }

    /// One-shot system-plus-user completion returning the assistant text.
    pub async fn complete(
        &mut self,
        model: Option<&str>,
        system_prompt: &str,
        user_content: &str,
        temperature: Option<f64>,
    ) -> Result<String, Error> {
        let messages = json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_content },
        ]);
        let response = self.chat_completion(model, messages, temperature).await?;
        message_content(&response)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::connection(SERVICE, "chat completion response missing message content")
            })
    }

    /// Completion constrained to a JSON schema, returning the parsed
    /// object. The common pattern for extracting structured data.
    pub async fn invoke_structured(
        &mut self,
        model: Option<&str>,
        system_prompt: &str,
        user_content: &str,
        schema_name: &str,
        schema: Value,
        temperature: Option<f64>,
    ) -> Result<Value, Error> {
        let body = json!({
            "model": model.unwrap_or(DEFAULT_MODEL),
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content },
            ],
            "temperature": temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": schema_name, "schema": schema },
            },
        });
        let result = self
            .client()
            .await?
            .request_retry(Method::POST, "/chat/completions", &[], Some(&body))
            .await?;
        let response = result.unwrap_or_else(|| json!({}));
        let content = message_content(&response).ok_or_else(|| {
            Error::connection(SERVICE, "chat completion response missing message content")
        })?;
        serde_json::from_str(content).map_err(|e| {
            Error::transport(SERVICE, "structured output is not valid JSON", e)
        })
    }

    /// List available models.
    pub async fn list_models(&mut self) -> Result<Vec<Value>, Error> {
        let result = self
            .client()
            .await?
            .request_retry(Method::GET, "/models", &[], None)
            .await?;
        Ok(result
            .and_then(|value| value.get("data").and_then(Value::as_array).cloned())
            .unwrap_or_default())
    }
}

fn message_content(response: &Value) -> Option<&str> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

#[async_trait]
impl Connection for OpenAiConnector {
    async fn connect(&mut self) -> Result<(), Error> {
        let api_key = self.credentials.openai_key()?;
        let client = RestClient::new(
            "OpenAI",
            self.api_base.clone(),
            Auth::BearerKey(api_key),
            self.retry.clone(),
        )?;
        self.client = Some(client);
        tracing::info!("connected to OpenAI");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        tracing::debug!("disconnected from OpenAI");
    }

    async fn health_check(&mut self) -> bool {
        self.client.is_some()
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}
