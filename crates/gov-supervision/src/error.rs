// error.rs — Error types for supervision sessions.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SupervisionError {
    #[error("session store error: {0}")]
    Store(#[from] gov_store::StoreError),

    /// Recording or resolving an intervention in agent history failed.
    #[error("intervention history error: {0}")]
    History(#[from] gov_policy::PolicyError),

    #[error("supervision session not found: {0}")]
    NotFound(Uuid),

    /// The requested lifecycle move is not allowed from the current state.
    #[error("invalid transition from {from} to {to} for session {session_id}")]
    InvalidTransition {
        session_id: Uuid,
        from: String,
        to: String,
    },
}
