//! Error types for the CCEF connections library.
//!
//! Every failure a connector can surface is a variant of [`Error`]. The
//! retry layer matches on [`ErrorKind`] rather than on concrete variants so
//! that only genuinely transient failures are ever retried.

use thiserror::Error;

/// Boxed source error chained onto transport-level failures.
type Source = Box<dyn std::error::Error + Send + Sync>;

/// All errors surfaced by this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A required credential environment variable is not set.
    #[error("required credential not found: {var}")]
    MissingCredential { var: String },

    /// A credential value could not be parsed as JSON, or had the wrong shape.
    #[error("credential {var} is not a valid JSON credential: {message}")]
    InvalidCredentialFormat { var: String, message: String },

    /// A JSON credential object is missing required keys.
    #[error("credential {var} missing required keys: {}", .fields.join(", "))]
    MissingCredentialField { var: String, fields: Vec<String> },

    /// The service could not be reached, or the transport failed mid-request.
    #[error("{service}: {message}")]
    ConnectionFailure {
        service: String,
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// Authentication was rejected (401), including after a token refresh.
    #[error("{service}: authentication failed ({status}): {body}")]
    AuthenticationFailure {
        service: String,
        status: u16,
        body: String,
    },

    /// The service rate limit was exceeded (429).
    #[error("{service}: rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded { service: String, retry_after: u64 },

    /// The service rejected the request (4xx/5xx other than 401/429).
    #[error("{service}: API error {status}: {body}")]
    RequestFailure {
        service: String,
        status: u16,
        body: String,
    },

    /// A data-warehouse query completed with errors.
    #[error("query failed: {message}")]
    QueryFailure { message: String },

    /// A data-warehouse write completed with errors.
    #[error("write failed: {message}")]
    WriteFailure { message: String },

    /// Configuration could not be loaded, or no cached configuration exists.
    #[error("configuration error: {message}")]
    ConfigurationFailure {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// Pagination followed continuation signals past the safety bound.
    #[error("{service}: pagination exceeded {pages} pages without terminating")]
    PaginationLimit { service: String, pages: u32 },
}

/// Coarse error classification used by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed credentials. Never retried.
    Credential,
    /// Transport/network failure.
    Connection,
    /// Rejected authentication. Never retried.
    Authentication,
    /// Upstream rate limiting.
    RateLimit,
    /// Generic request rejection (4xx/5xx).
    Request,
    /// Data-warehouse query failure. Never retried.
    Query,
    /// Data-warehouse write failure. Never retried.
    Write,
    /// Configuration failure. Never retried.
    Configuration,
    /// Pagination safety bound exceeded. Never retried.
    Pagination,
}

impl Error {
    /// The classification of this error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingCredential { .. }
            | Error::InvalidCredentialFormat { .. }
            | Error::MissingCredentialField { .. } => ErrorKind::Credential,
            Error::ConnectionFailure { .. } => ErrorKind::Connection,
            Error::AuthenticationFailure { .. } => ErrorKind::Authentication,
            Error::RateLimitExceeded { .. } => ErrorKind::RateLimit,
            Error::RequestFailure { .. } => ErrorKind::Request,
            Error::QueryFailure { .. } => ErrorKind::Query,
            Error::WriteFailure { .. } => ErrorKind::Write,
            Error::ConfigurationFailure { .. } => ErrorKind::Configuration,
            Error::PaginationLimit { .. } => ErrorKind::Pagination,
        }
    }

    /// The server-suggested wait, if this is a rate-limit error.
    ///
    /// Carried for callers; the retry backoff schedule does not consume it.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub(crate) fn connection(service: &str, message: impl Into<String>) -> Self {
        Error::ConnectionFailure {
            service: service.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn transport(
        service: &str,
        context: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::ConnectionFailure {
            service: service.to_string(),
            message: format!("{context}: {source}"),
            source: Some(Box::new(source)),
        }
    }
}
