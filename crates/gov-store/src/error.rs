// error.rs — Error types for record persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize a record.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The record id cannot be used as a storage key.
    #[error("invalid record id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// The backend is unavailable (used by non-file backends).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::IoError { .. } | StoreError::Unavailable(_))
    }
}
