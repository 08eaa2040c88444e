//! Error types for threadmine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using threadmine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for threadmine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Item not found in the library
    #[error("Item not found: {0}")]
    ItemNotFound(uuid::Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Text generation failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// Similarity search failed
    #[error("Search error: {0}")]
    Search(String),

    /// Authentication with an external collaborator failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// External collaborator rejected the call with a rate limit
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// External call exceeded its timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The time window contained no usable conversation data
    #[error("No data: {0}")]
    NoData(String),

    /// Run was cancelled by the caller
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

/// User-facing error category attached to a run's terminal error event.
///
/// Collaborator failures must stay distinguishable end to end so a caller
/// can render an actionable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Timeout,
    NoData,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Timeout => write!(f, "timeout"),
            Self::NoData => write!(f, "no_data"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl Error {
    /// Map this error onto the user-facing category taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Unauthorized(_) => ErrorCategory::Auth,
            Error::RateLimited(_) => ErrorCategory::RateLimit,
            Error::Timeout(_) => ErrorCategory::Timeout,
            Error::NoData(_) => ErrorCategory::NoData,
            _ => ErrorCategory::Unknown,
        }
    }
}
