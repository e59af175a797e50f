//! Error types for the ingestion pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input path does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Container or document structure failed validation
    #[error("Failed to parse file '{path}': {message}")]
    Format { path: String, message: String },

    /// Stream decompression or text decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Concept extraction call failed or returned unusable output
    #[error("Model error: {0}")]
    Model(String),

    /// Graph store write failed
    #[error("Graph store error: {0}")]
    Store(String),

    /// External service failed in a way that may clear up on a later attempt
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Processing a file exceeded its time budget
    #[error("Timed out after {secs}s processing '{path}'")]
    Timeout { path: String, secs: u64 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a format error for a file
    pub fn format(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    /// Create a graph store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create an error for a failure worth retrying
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(err) => err.is_timeout() || err.is_connect(),
            Error::Unavailable(_) => true,
            _ => false,
        }
    }
}

/// 5xx and 429 responses are worth retrying; other failures are not
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Timeouts and refused connections are worth retrying
pub fn is_retryable_request(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.to_string())
    }
}
