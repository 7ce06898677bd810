// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during policy operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The agent record store failed.
    #[error("agent store error: {0}")]
    Store(#[from] gov_store::StoreError),

    /// Maturity thresholds are not strictly increasing inside (0, 1].
    #[error("invalid maturity thresholds: {reason}")]
    InvalidThresholds { reason: String },

    /// A rule set file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A rule set file is not valid YAML for the rule schema.
    #[error("failed to parse rule set: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The agent history backend failed.
    #[error("history unavailable: {0}")]
    History(String),
}
