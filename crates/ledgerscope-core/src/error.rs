//! Error types for ledgerscope-core.
//!
//! The taxonomy follows how failures are actually handled:
//!
//! - transient fetch failures are retained locally (last good value wins)
//!   and retried on the next scheduled interval, never surfaced as fatal;
//! - purge failures are surfaced verbatim and never retried automatically,
//!   since retrying a destructive action without confirmation is unsafe;
//! - a cursor with missing range data is *not* an error at all (see
//!   `TimeRange::Unknown`).

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ledgerscope-core.
#[derive(Error, Debug)]
pub enum Error {
    /// Data-source (status endpoint) errors.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration errors.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime errors (channel failures, task joins, etc.).
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors from the ingestion data source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The status endpoint could not be reached.
    #[error("Status endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("Status endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint's payload could not be decoded.
    #[error("Failed to decode status payload: {0}")]
    Decode(String),

    /// The change subscription channel closed unexpectedly.
    #[error("Change subscription closed")]
    SubscriptionClosed,

    /// A purge request failed server-side.
    #[error("Purge failed: {0}")]
    Purge(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Check whether an error is transient (worth retrying on the next poll).
///
/// The scheduler backs transient failures off exponentially; non-transient
/// ones jump straight to the backoff ceiling. Purge failures and
/// configuration problems are never transient; network reachability and
/// server-side errors usually are.
#[must_use]
pub fn is_transient(error: &Error) -> bool {
    match error {
        Error::Source(e) => match e {
            SourceError::Unreachable(_) => true,
            // 5xx is transient; 4xx means the request itself is wrong.
            SourceError::Status { status, .. } => *status >= 500,
            SourceError::Decode(_) => false,
            SourceError::SubscriptionClosed => true,
            SourceError::Purge(_) => false,
        },
        Error::Io(_) => true,
        Error::Runtime(_) => true,
        Error::Config(_) => false,
    }
}
