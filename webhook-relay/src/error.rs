//! Error handling for the webhook relay.
//!
//! Errors raised while acquiring credentials or forwarding events never reach the
//! upstream platform: the ingestion route acknowledges unconditionally and these
//! errors are routed to the log and the event bus instead, logged at the level
//! given by [`Error::severity`].

use thiserror::Error;

/// Result type for webhook relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the webhook relay.
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client-credentials exchange failed.
    #[error("Credential acquisition failed: {0}")]
    Auth(String),

    /// The downstream endpoint did not accept the forwarded event.
    #[error("Forwarding failed: {0}")]
    Forward(String),

    /// Transport level HTTP error (connection, timeout, bind).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error severity for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Informational errors (e.g., malformed input)
    Info,
    /// Warning-level errors (e.g., downstream rejected an event)
    Warning,
    /// Critical errors (e.g., misconfiguration)
    Critical,
}

impl Error {
    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::Json(_) => ErrorSeverity::Info,
            Error::Auth(_) | Error::Forward(_) | Error::Http(_) => ErrorSeverity::Warning,
            Error::Config(_) | Error::Io(_) => ErrorSeverity::Critical,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration_error",
            Error::Auth(_) => "auth_error",
            Error::Forward(_) => "forward_error",
            Error::Http(_) => "http_error",
            Error::Json(_) => "json_error",
            Error::Io(_) => "io_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Http(format!("request timed out: {}", err))
        } else {
            Error::Http(err.to_string())
        }
    }
}
