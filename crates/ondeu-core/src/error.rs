//! Error types for ondeu.

use thiserror::Error;

/// Result type alias using ondeu's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ondeu operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Query, transaction or pool failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tree node not found
    #[error("Tree not found: {0}")]
    TreeNotFound(i64),

    /// Document not found (or not attached to the requested tree)
    #[error("Document not found: {0}")]
    DocumentNotFound(i64),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Identity provider call failed
    #[error("Identity provider error: {0}")]
    Identity(String),

    /// No usable credentials on the request
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Token decoded but its claims are unusable
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Authenticated but none of the required roles are held
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing or malformed environment setting.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Outbound HTTP call failed before a response arrived.
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for every variant that means "the addressed row does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::TreeNotFound(_) | Error::DocumentNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
