// error.rs — Error types for execution recovery.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::failure::FailureKind;

/// Why a single execution attempt failed, as reported by the executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("attempt timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("executor crashed: {0}")]
    Crash(String),

    #[error("network failure: {0}")]
    Network(String),

    /// The executor refused the action outright. Never retried.
    #[error("executor rejected the action: {0}")]
    Rejected(String),
}

impl ExecutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutionError::Timeout { .. } => FailureKind::Timeout,
            ExecutionError::Crash(_) | ExecutionError::Rejected(_) => FailureKind::Crash,
            ExecutionError::Network(_) => FailureKind::Network,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecutionError::Rejected(_))
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// No checkpoint exists; the caller restarts from the beginning.
    #[error("no checkpoint for execution {0}")]
    NoCheckpoint(Uuid),

    #[error("execution {execution_id} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        execution_id: Uuid,
        attempts: u32,
        last_error: ExecutionError,
    },

    #[error("execution {execution_id} cancelled after {attempts} attempts")]
    Cancelled { execution_id: Uuid, attempts: u32 },

    /// A non-retryable failure ended the loop early.
    #[error("execution {execution_id} failed permanently: {error}")]
    Permanent {
        execution_id: Uuid,
        error: ExecutionError,
    },
}
