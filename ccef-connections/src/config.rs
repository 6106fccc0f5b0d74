//! Configuration management.
//!
//! [`ConfigManager`] reads configuration from a Google Sheets worksheet
//! shaped as `Section | Key | Value | Description` rows, caches it with a
//! TTL, coerces value types, and applies `CCEF_{SECTION}_{KEY}`
//! environment variable overrides.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::connectors::SheetsConnector;
use crate::error::Error;

/// Nested `section -> key -> value` configuration map.
pub type ConfigMap = BTreeMap<String, BTreeMap<String, ConfigValue>>;

const DEFAULT_WORKSHEET: &str = "Config";
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A configuration value coerced from its spreadsheet/env string.
///
/// Coercion order: boolean (`true`/`yes`/`1`, `false`/`no`/`0`,
/// case-insensitive), then integer, then float, else the original string.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    /// Coerce a raw string into its typed value.
    pub fn coerce(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => return ConfigValue::Bool(true),
            "false" | "no" | "0" => return ConfigValue::Bool(false),
            _ => {}
        }
        if let Ok(int) = raw.parse::<i64>() {
            return ConfigValue::Int(int);
        }
        if let Ok(float) = raw.parse::<f64>() {
            return ConfigValue::Float(float);
        }
        ConfigValue::Str(raw.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(value) => Some(*value),
            ConfigValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(value) => write!(f, "{value}"),
            ConfigValue::Int(value) => write!(f, "{value}"),
            ConfigValue::Float(value) => write!(f, "{value}"),
            ConfigValue::Str(value) => write!(f, "{value}"),
        }
    }
}

/// Spreadsheet-backed configuration with a TTL cache.
///
/// # Example
///
/// ```rust,ignore
/// let sheets = SheetsConnector::new(store);
/// let mut config = ConfigManager::new(sheets, "SPREADSHEET_ID");
/// let base_id = config.get("airtable", "base_id").await?;
/// ```
pub struct ConfigManager {
    sheets: SheetsConnector,
    sheets_id: String,
    worksheet_name: String,
    ttl: Duration,
    auto_refresh: bool,
    cache: Option<ConfigMap>,
    fetched_at: Option<Instant>,
}

impl ConfigManager {
    /// Create a manager reading the `Config` worksheet of the given
    /// spreadsheet, with a 5-minute TTL and auto-refresh on.
    pub fn new(sheets: SheetsConnector, sheets_id: impl Into<String>) -> Self {
        Self {
            sheets,
            sheets_id: sheets_id.into(),
            worksheet_name: DEFAULT_WORKSHEET.to_string(),
            ttl: DEFAULT_TTL,
            auto_refresh: true,
            cache: None,
            fetched_at: None,
        }
    }

    /// Read configuration from a different worksheet.
    pub fn with_worksheet(mut self, name: impl Into<String>) -> Self {
        self.worksheet_name = name.into();
        self
    }

    /// Change the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Disable (or re-enable) refreshing when the cache expires. With
    /// auto-refresh off an expired cache is returned stale, with a
    /// warning.
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// The full configuration, refreshing from the sheet when the cache is
    /// missing or expired (and auto-refresh is on).
    pub async fn get_config(&mut self) -> Result<&ConfigMap, Error> {
        if self.cache.is_none() || !self.is_cache_valid() {
            if self.auto_refresh {
                self.refresh().await?;
            } else if self.cache.is_some() {
                tracing::warn!("returning expired cached configuration");
            } else {
                return Err(Error::ConfigurationFailure {
                    message: "no configuration available; call refresh() to load it".to_string(),
                    source: None,
                });
            }
        }
        match &self.cache {
            Some(config) => Ok(config),
            None => Err(Error::ConfigurationFailure {
                message: "failed to load configuration".to_string(),
                source: None,
            }),
        }
    }

    /// Re-read the sheet, apply coercion and environment overrides, and
    /// stamp the cache.
    pub async fn refresh(&mut self) -> Result<(), Error> {
        tracing::info!("refreshing configuration from Google Sheets");
        let rows = self
            .sheets
            .get_worksheet_as_dicts(&self.sheets_id, &self.worksheet_name, 0)
            .await
            .map_err(|e| Error::ConfigurationFailure {
                message: format!("failed to refresh configuration: {e}"),
                source: Some(Box::new(e)),
            })?;

        let mut config = parse_rows(rows);
        apply_env_overrides(&mut config);

        tracing::info!(sections = config.len(), "configuration refreshed");
        self.cache = Some(config);
        self.fetched_at = Some(Instant::now());
        Ok(())
    }

    /// One configuration value, or `None` when the section/key is absent.
    pub async fn get(&mut self, section: &str, key: &str) -> Result<Option<ConfigValue>, Error> {
        let config = self.get_config().await?;
        Ok(config.get(section).and_then(|keys| keys.get(key)).cloned())
    }

    /// Drop the cached configuration.
    pub fn clear_cache(&mut self) {
        self.cache = None;
        self.fetched_at = None;
        tracing::debug!("configuration cache cleared");
    }

    /// Age of the current cache; zero when nothing is cached.
    pub fn cache_age(&self) -> Duration {
        self.fetched_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Whether a cache exists and has not outlived the TTL.
    pub fn is_cache_valid(&self) -> bool {
        match (&self.cache, self.fetched_at) {
            (Some(_), Some(at)) => at.elapsed() < self.ttl,
            _ => false,
        }
    }
}

fn parse_rows(rows: Vec<HashMap<String, String>>) -> ConfigMap {
    let mut config = ConfigMap::new();
    for row in rows {
        let section = row.get("Section").map(|s| s.trim()).unwrap_or_default();
        let key = row.get("Key").map(|s| s.trim()).unwrap_or_default();
        let value = row.get("Value").map(String::as_str).unwrap_or_default();
        if section.is_empty() || key.is_empty() {
            tracing::warn!(?row, "skipping config row without section or key");
            continue;
        }
        config
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), ConfigValue::coerce(value));
    }
    config
}

/// `CCEF_{SECTION}_{KEY}` environment variables override loaded values,
/// after the same type coercion.
fn apply_env_overrides(config: &mut ConfigMap) {
    for (section, keys) in config.iter_mut() {
        for (key, value) in keys.iter_mut() {
            let var = format!(
                "CCEF_{}_{}",
                section.to_uppercase(),
                key.to_uppercase()
            );
            if let Ok(raw) = std::env::var(&var) {
                *value = ConfigValue::coerce(&raw);
                tracing::debug!(var, "applied environment override");
            }
        }
    }
}
