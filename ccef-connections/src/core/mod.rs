//! Shared connection core.
//!
//! Everything the per-service connectors have in common lives here: the
//! [`connection::Connection`] interface, the [`credentials::CredentialStore`],
//! the [`retry::RetryPolicy`] presets, the HTTP request core with its
//! token-refresh state machine, and the pagination driver.

pub mod connection;
pub mod credentials;
pub mod retry;

pub(crate) mod http;
pub(crate) mod pagination;
