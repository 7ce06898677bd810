// error.rs — Error types for the proposal subsystem.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProposalError {
    /// The proposal store failed.
    #[error("proposal store error: {0}")]
    Store(#[from] gov_store::StoreError),

    /// Required fields are missing; nothing was scored.
    #[error("proposal {proposal_id} is incomplete, missing: {}", missing.join(", "))]
    IncompleteProposal {
        proposal_id: Uuid,
        missing: Vec<String>,
    },

    /// Only pending proposals can be resolved.
    #[error("invalid transition from {from} to {to} for proposal {proposal_id}")]
    InvalidTransition {
        proposal_id: Uuid,
        from: String,
        to: String,
    },
}
