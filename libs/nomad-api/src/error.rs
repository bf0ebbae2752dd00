//! Error types for job documents and rendering.

use thiserror::Error;

/// Errors that can occur when handling job documents.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The scheduler could not convert an alternate job format.
    #[error("job parse failed: {0}")]
    Parse(String),

    /// The document is not a usable job document.
    #[error("invalid job document: {0}")]
    InvalidDocument(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}
