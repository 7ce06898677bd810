// error.rs — Error types for the audit subsystem.
//
// Each variant maps to a specific failure mode in the audit pipeline.
// `is_transient()` drives the retry decision in AuditTrail.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a record to the log.
    #[error("failed to append record: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize a record (malformed JSON).
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The audit log has been tampered with: the hash chain is broken.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },

    /// The sink is temporarily unreachable.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    /// Every bounded retry failed; the record was not written.
    #[error("audit write failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl AuditError {
    /// Whether a later attempt at the same write could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuditError::WriteFailed(_) | AuditError::Unavailable(_))
    }
}
