//! Error types for querymind-rs
//!
//! This module provides the crate-wide error type. Expected per-request failures
//! (unsafe questions, unusable model output, failed SELECTs) are not errors here:
//! they travel as data through the pipeline. `QueryMindError` covers setup faults
//! and collaborator failures that callers must handle.

use thiserror::Error;

/// Main error type for querymind operations
#[derive(Error, Debug)]
pub enum QueryMindError {
    /// Schema chunking errors
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Completion provider errors
    #[error("Completion error: {0}")]
    Completion(String),

    /// Embedding index errors (dimension mismatch, corrupt entries)
    #[error("Index error: {0}")]
    Index(String),

    /// The collection for an identity is missing or holds zero entries
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Index storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Errors raised by the queried database collaborator
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite errors
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for querymind operations
pub type Result<T> = std::result::Result<T, QueryMindError>;

impl From<async_openai::error::OpenAIError> for QueryMindError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        QueryMindError::Completion(err.to_string())
    }
}

impl QueryMindError {
    /// True when the failure means the identity's index must be rebuilt
    pub fn is_index_unavailable(&self) -> bool {
        matches!(self, QueryMindError::IndexUnavailable(_))
    }
}
