//! Error types for the Tollgate service.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Tollgate operations.
///
/// A rejected request is not an error: it is a regular
/// [`RateDecision`](crate::ratelimit::RateDecision) with `admitted == false`.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration was loaded but describes nonsensical bounds
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The window store could not answer (connection refused, timeout, ...)
    #[error("Window store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for TollgateError {
    fn from(err: ::config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
