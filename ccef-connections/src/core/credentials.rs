//! Credential management.
//!
//! Credentials are resolved from environment variables using the
//! `{CREDENTIAL_NAME}_PASSWORD` naming convention required for Civis
//! compatibility. A `.env` file is loaded once for local development when a
//! process-environment-backed store is constructed.
//!
//! The store is an explicit value, not a global: construct one
//! [`CredentialStore`] and pass clones to each connector. Clones share a
//! single cache, so every credential is read from the environment at most
//! once per process.
//!
//! # Example
//!
//! ```rust,ignore
//! use ccef_connections::CredentialStore;
//!
//! let store = CredentialStore::new();
//! let api_key = store.airtable_key()?;
//! let zoom = store.zoom_credentials()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use zeroize::Zeroize;

use crate::error::Error;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the
/// value, and the buffer is zeroed on drop.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// HelpScout OAuth2 application credentials.
#[derive(Debug, Clone)]
pub struct HelpScoutCredentials {
    pub app_id: String,
    pub app_secret: Secret,
}

/// Zoom Server-to-Server OAuth credentials.
#[derive(Debug, Clone)]
pub struct ZoomCredentials {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: Secret,
}

/// ROI CRM OAuth2 credentials for the Auth0 token exchange.
#[derive(Debug, Clone)]
pub struct RoiCrmCredentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub audience: String,
    pub roi_client_code: String,
}

/// Action Builder API token plus the tenant subdomain it belongs to.
#[derive(Debug, Clone)]
pub struct ActionBuilderCredentials {
    pub api_token: Secret,
    pub subdomain: String,
}

/// Google OAuth2 credentials used by the Sheets and BigQuery connectors.
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub refresh_token: Secret,
    /// GCP project id; consulted by BigQuery when not given explicitly.
    pub project_id: Option<String>,
}

enum EnvSource {
    /// The process environment, with `.env` loaded at construction.
    Process,
    /// A fixed snapshot, for tests and hermetic embedding.
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    fn var(&self, name: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

struct StoreInner {
    env: EnvSource,
    cache: RwLock<HashMap<String, Secret>>,
}

/// Resolves named secrets from `{NAME}_PASSWORD` environment variables.
///
/// Successful resolutions are cached for the lifetime of the store, keyed
/// by name; [`clear_cache`](CredentialStore::clear_cache) exists for
/// rotation and testing. Clones share the cache.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    /// Create a store backed by the process environment.
    ///
    /// Loads a `.env` file if one exists (local development parity with the
    /// production environment).
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        tracing::debug!("environment variables loaded");
        Self {
            inner: Arc::new(StoreInner {
                env: EnvSource::Process,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a store backed by a fixed environment snapshot.
    ///
    /// Keys are full variable names (`ZOOM_CREDENTIALS_PASSWORD`, not
    /// `ZOOM_CREDENTIALS`).
    pub fn with_env(vars: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                env: EnvSource::Fixed(vars),
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Resolve a required credential.
    pub fn get(&self, name: &str) -> Result<Secret, Error> {
        self.lookup(name).ok_or_else(|| Error::MissingCredential {
            var: env_var_name(name),
        })
    }

    /// Resolve an optional credential. Absence is not an error.
    pub fn get_optional(&self, name: &str) -> Option<Secret> {
        self.lookup(name)
    }

    /// Resolve a required credential and parse it as JSON.
    pub fn get_json(&self, name: &str) -> Result<Value, Error> {
        let secret = self.get(name)?;
        serde_json::from_str(secret.expose()).map_err(|e| Error::InvalidCredentialFormat {
            var: env_var_name(name),
            message: e.to_string(),
        })
    }

    /// Whether a credential can be resolved, without treating absence as an
    /// error.
    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Drop all cached values. Useful for credential rotation and testing.
    pub fn clear_cache(&self) {
        self.inner.cache.write().clear();
        tracing::debug!("credentials cache cleared");
    }

    fn lookup(&self, name: &str) -> Option<Secret> {
        if let Some(hit) = self.inner.cache.read().get(name) {
            tracing::trace!(credential = name, "retrieved credential from cache");
            return Some(hit.clone());
        }
        let value = self.inner.env.var(&env_var_name(name))?;
        let secret = Secret::new(value);
        self.inner
            .cache
            .write()
            .insert(name.to_string(), secret.clone());
        tracing::debug!(credential = name, "loaded and cached credential");
        Some(secret)
    }

    /// Resolve a JSON credential, requiring an object with the given keys.
    fn json_object(&self, name: &str, required: &[&str]) -> Result<Map<String, Value>, Error> {
        let var = env_var_name(name);
        let object = match self.get_json(name)? {
            Value::Object(map) => map,
            _ => {
                return Err(Error::InvalidCredentialFormat {
                    var,
                    message: "must be a JSON object".into(),
                })
            }
        };
        let missing: Vec<String> = required
            .iter()
            .filter(|key| !object.contains_key(**key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingCredentialField {
                var,
                fields: missing,
            });
        }
        Ok(object)
    }

    // -- Per-service lookups --------------------------------------------------

    /// The Airtable API key (`AIRTABLE_API_KEY_PASSWORD`).
    pub fn airtable_key(&self) -> Result<Secret, Error> {
        self.get("AIRTABLE_API_KEY")
    }

    /// The OpenAI API key (`OPENAI_API_KEY_PASSWORD`).
    pub fn openai_key(&self) -> Result<Secret, Error> {
        self.get("OPENAI_API_KEY")
    }

    /// The Action Network API key (`ACTION_NETWORK_API_KEY_PASSWORD`).
    pub fn action_network_key(&self) -> Result<Secret, Error> {
        self.get("ACTION_NETWORK_API_KEY")
    }

    /// The PTV API key (`PTV_API_KEY_PASSWORD`).
    pub fn ptv_api_key(&self) -> Result<Secret, Error> {
        self.get("PTV_API_KEY")
    }

    /// HelpScout OAuth2 credentials (`HELPSCOUT_CREDENTIALS_PASSWORD`).
    pub fn helpscout_credentials(&self) -> Result<HelpScoutCredentials, Error> {
        let name = "HELPSCOUT_CREDENTIALS";
        let object = self.json_object(name, &["app_id", "app_secret"])?;
        Ok(HelpScoutCredentials {
            app_id: require_str(&object, name, "app_id")?,
            app_secret: Secret::new(require_str(&object, name, "app_secret")?),
        })
    }

    /// Zoom Server-to-Server OAuth credentials (`ZOOM_CREDENTIALS_PASSWORD`).
    pub fn zoom_credentials(&self) -> Result<ZoomCredentials, Error> {
        let name = "ZOOM_CREDENTIALS";
        let object = self.json_object(name, &["account_id", "client_id", "client_secret"])?;
        Ok(ZoomCredentials {
            account_id: require_str(&object, name, "account_id")?,
            client_id: require_str(&object, name, "client_id")?,
            client_secret: Secret::new(require_str(&object, name, "client_secret")?),
        })
    }

    /// ROI CRM OAuth2 credentials (`ROI_CRM_CREDENTIALS_PASSWORD`).
    pub fn roi_crm_credentials(&self) -> Result<RoiCrmCredentials, Error> {
        let name = "ROI_CRM_CREDENTIALS";
        let object = self.json_object(
            name,
            &["client_id", "client_secret", "audience", "roi_client_code"],
        )?;
        Ok(RoiCrmCredentials {
            client_id: require_str(&object, name, "client_id")?,
            client_secret: Secret::new(require_str(&object, name, "client_secret")?),
            audience: require_str(&object, name, "audience")?,
            roi_client_code: require_str(&object, name, "roi_client_code")?,
        })
    }

    /// Action Builder credentials (`ACTION_BUILDER_CREDENTIALS_PASSWORD`).
    pub fn action_builder_credentials(&self) -> Result<ActionBuilderCredentials, Error> {
        let name = "ACTION_BUILDER_CREDENTIALS";
        let object = self.json_object(name, &["api_token", "subdomain"])?;
        Ok(ActionBuilderCredentials {
            api_token: Secret::new(require_str(&object, name, "api_token")?),
            subdomain: require_str(&object, name, "subdomain")?,
        })
    }

    /// Google credentials for Sheets (`GOOGLE_SHEETS_CREDENTIALS_PASSWORD`).
    pub fn google_sheets_credentials(&self) -> Result<GoogleCredentials, Error> {
        self.google_credentials("GOOGLE_SHEETS_CREDENTIALS")
    }

    /// Google credentials for BigQuery (`BIGQUERY_CREDENTIALS_PASSWORD`).
    pub fn bigquery_credentials(&self) -> Result<GoogleCredentials, Error> {
        self.google_credentials("BIGQUERY_CREDENTIALS")
    }

    fn google_credentials(&self, name: &str) -> Result<GoogleCredentials, Error> {
        let object = self.json_object(name, &["client_id", "client_secret", "refresh_token"])?;
        let project_id = object
            .get("project_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(GoogleCredentials {
            client_id: require_str(&object, name, "client_id")?,
            client_secret: Secret::new(require_str(&object, name, "client_secret")?),
            refresh_token: Secret::new(require_str(&object, name, "refresh_token")?),
            project_id,
        })
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.inner.cache.read().len();
        f.debug_struct("CredentialStore")
            .field("cached_credentials", &count)
            .finish()
    }
}

fn env_var_name(name: &str) -> String {
    format!("{name}_PASSWORD")
}

fn require_str(object: &Map<String, Value>, name: &str, key: &str) -> Result<String, Error> {
    match object.get(key).and_then(Value::as_str) {
        Some(value) => Ok(value.to_string()),
        None => Err(Error::InvalidCredentialFormat {
            var: env_var_name(name),
            message: format!("key '{key}' must be a string"),
        }),
    }
}
