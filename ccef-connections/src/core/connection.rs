//! The common interface implemented by every connector.

use async_trait::async_trait;

use crate::error::Error;

/// Connection lifecycle shared by all CCEF connectors.
///
/// Connectors also auto-connect when an operation is invoked while
/// disconnected, so calling [`connect`](Connection::connect) explicitly is
/// only needed to surface credential problems early.
#[async_trait]
pub trait Connection {
    /// Establish the connection: resolve credentials and prime any auth
    /// state (for OAuth services this fetches the initial bearer token, so
    /// bad credentials fail here rather than on the first request).
    async fn connect(&mut self) -> Result<(), Error>;

    /// Drop all session state. Safe to call when already disconnected.
    fn disconnect(&mut self);

    /// Probe whether the connection is usable. Never fails; any error maps
    /// to `false`.
    async fn health_check(&mut self) -> bool;

    /// Whether `connect` has succeeded and `disconnect` has not been called
    /// since.
    fn is_connected(&self) -> bool;
}
