//! Error types for papercast
//!
//! The taxonomy separates failures that abort a whole run (configuration,
//! credentials, enumeration) from failures that stay inside a single work item
//! (transient, quota, permanent). Every per-item error carries a [`RetryClass`]
//! tag so the retry loop can decide what to do without inspecting error types.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for papercast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for papercast
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration document is missing, unreadable or invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "model_name")
        key: Option<String>,
    },

    /// A required credential was not present in the environment
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// The set of work items could not be listed at all
    #[error("enumeration failed: {0}")]
    Enumeration(String),

    /// Failure expected to clear on retry (timeout, 5xx, connection reset)
    #[error("transient failure: {0}")]
    Transient(String),

    /// Remote service rejected the call because of its request quota
    #[error("quota exceeded: {message}")]
    QuotaExceeded {
        /// Message returned by the remote service
        message: String,
        /// Server-provided hint for how long to wait before the next call
        retry_after: Option<Duration>,
    },

    /// Request that will never succeed as sent (4xx, malformed payload)
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Network error raised by the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Work was cancelled before it could run
    #[error("cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// How a failure should be treated by the retry loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    /// Retry with the normal exponential backoff
    Transient,
    /// Retry with a longer backoff, honoring any server hint
    Quota,
    /// Do not retry
    Permanent,
}

impl Error {
    /// Create a configuration error pointing at a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Returns true for errors that abort the whole run rather than one item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::MissingCredential(_) | Error::Enumeration(_)
        )
    }

    /// Server-provided wait hint, if this is a quota error that carried one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::QuotaExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Machine-readable error code used in summaries
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::MissingCredential(_) => "missing_credential",
            Error::Enumeration(_) => "enumeration_error",
            Error::Transient(_) => "transient_error",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::Permanent(_) => "permanent_error",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Classify a raw HTTP status code into an error carrying the right tag.
///
/// 429 becomes [`Error::QuotaExceeded`], 5xx and 408 are transient, every other
/// non-success status is permanent.
pub fn error_for_status(status: u16, body: &str, retry_after: Option<Duration>) -> Error {
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", truncate(body, 200))
    };

    match status {
        429 => Error::QuotaExceeded {
            message,
            retry_after,
        },
        408 | 500..=599 => Error::Transient(message),
        _ => Error::Permanent(message),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
