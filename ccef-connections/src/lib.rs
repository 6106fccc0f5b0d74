//! # CCEF Connections
//!
//! Unified connection and credential management for CCEF data integrations.
//!
//! This crate provides:
//! - Thin async REST clients for the services CCEF integrates with
//!   (Airtable, Action Network, Action Builder, BigQuery, Google Sheets,
//!   HelpScout, OpenAI, PTV, ROI CRM, Zoom), all behind a common
//!   connect/disconnect/health-check interface
//! - A [`CredentialStore`] that resolves secrets from `{NAME}_PASSWORD`
//!   environment variables with a process-lifetime cache
//! - Deterministic exponential-backoff [`RetryPolicy`] presets per service
//! - A [`ConfigManager`] that caches configuration loaded from a
//!   spreadsheet, with `CCEF_{SECTION}_{KEY}` environment overrides
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ccef_connections::{Connection, CredentialStore, ZoomConnector};
//!
//! async fn attendees(meeting_id: &str) -> Result<(), ccef_connections::Error> {
//!     let credentials = CredentialStore::new();
//!     let mut zoom = ZoomConnector::new(credentials);
//!     zoom.connect().await?;
//!     let participants = zoom.get_past_meeting_participants(meeting_id).await?;
//!     println!("{} participants", participants.len());
//!     zoom.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! Connectors auto-connect on first use, so the explicit `connect()` above
//! is optional; it exists to surface credential problems early.

pub mod config;
pub mod connectors;
pub mod core;
pub mod error;

// Re-export commonly used types at crate root
pub use config::{ConfigManager, ConfigValue};

pub use connectors::{
    ActionBuilderConnector,
    ActionNetworkConnector,
    AirtableConnector,
    BigQueryConnector,
    ConversationStatus,
    HelpScoutConnector,
    OpenAiConnector,
    PtvConnector,
    RoiCrmConnector,
    SheetsConnector,
    ZoomConnector,
};

pub use crate::core::connection::Connection;

pub use crate::core::credentials::{
    ActionBuilderCredentials,
    CredentialStore,
    GoogleCredentials,
    HelpScoutCredentials,
    RoiCrmCredentials,
    Secret,
    ZoomCredentials,
};

pub use crate::core::retry::{RetryOn, RetryPolicy};

pub use error::{Error, ErrorKind};
