// error.rs — Error taxonomy of the engine's inbound surface.
//
// Errors from the component crates are folded into EngineError so callers
// see one type. `is_retryable` separates transient failures from ones that
// will fail the same way on every retry.

use gov_policy::PolicyError;
use gov_proposal::ProposalError;
use gov_recovery::RecoveryError;
use gov_store::StoreError;
use gov_supervision::SupervisionError;
use thiserror::Error;
use uuid::Uuid;

use crate::trigger::TriggerDecision;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed trigger, rejected before any side effect.
    #[error("invalid trigger: {reason}")]
    InvalidTrigger { reason: String },

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// The backing store failed while resolving the agent. Not retried
    /// within the same request.
    #[error("agent resolution failed: {reason}")]
    ResolutionFailed { reason: String },

    #[error("proposal {proposal_id} is missing required fields: {}", missing.join(", "))]
    IncompleteProposal {
        proposal_id: Uuid,
        missing: Vec<String>,
    },

    #[error("proposal {proposal_id} cannot be approved: {}", reasons.join("; "))]
    NotApprovable {
        proposal_id: Uuid,
        reasons: Vec<String>,
    },

    #[error("invalid {entity} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },

    #[error("execution {execution_id} failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        execution_id: Uuid,
        attempts: u32,
        last_error: String,
    },

    #[error("execution {execution_id} cancelled after {attempts} attempt(s)")]
    Cancelled { execution_id: Uuid, attempts: u32 },

    #[error("execution {execution_id} failed: {reason}")]
    ExecutionFailed { execution_id: Uuid, reason: String },

    /// The governance outcome stands but its audit record could not be
    /// written. For routing, the stored decision is attached.
    #[error("audit write failed for {subject}: {reason}")]
    AuditWriteFailed {
        subject: String,
        reason: String,
        decision: Option<Box<TriggerDecision>>,
    },

    #[error("proposal not found: {0}")]
    ProposalNotFound(Uuid),

    #[error("supervision session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("agent {agent_id} is not eligible for graduation: {}", reasons.join("; "))]
    NotEligible {
        agent_id: String,
        reasons: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("policy error: {0}")]
    Policy(String),

    #[error("recovery error: {0}")]
    Recovery(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True for transient failures a caller may retry: store I/O and audit
    /// write failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_transient(),
            EngineError::AuditWriteFailed { .. } => true,
            _ => false,
        }
    }

    /// The decision carried by an `AuditWriteFailed` from routing.
    pub fn decision(&self) -> Option<&TriggerDecision> {
        match self {
            EngineError::AuditWriteFailed { decision, .. } => decision.as_deref(),
            _ => None,
        }
    }
}

impl From<PolicyError> for EngineError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::Store(e) => EngineError::Store(e),
            other => EngineError::Policy(other.to_string()),
        }
    }
}

impl From<ProposalError> for EngineError {
    fn from(e: ProposalError) -> Self {
        match e {
            ProposalError::Store(e) => EngineError::Store(e),
            ProposalError::IncompleteProposal {
                proposal_id,
                missing,
            } => EngineError::IncompleteProposal {
                proposal_id,
                missing,
            },
            ProposalError::InvalidTransition {
                proposal_id,
                from,
                to,
            } => EngineError::InvalidTransition {
                entity: "proposal",
                id: proposal_id,
                from,
                to,
            },
        }
    }
}

impl From<SupervisionError> for EngineError {
    fn from(e: SupervisionError) -> Self {
        match e {
            SupervisionError::Store(e) => EngineError::Store(e),
            SupervisionError::History(e) => e.into(),
            SupervisionError::NotFound(id) => EngineError::SessionNotFound(id),
            SupervisionError::InvalidTransition {
                session_id,
                from,
                to,
            } => EngineError::InvalidTransition {
                entity: "session",
                id: session_id,
                from,
                to,
            },
        }
    }
}

impl From<RecoveryError> for EngineError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::RetriesExhausted {
                execution_id,
                attempts,
                last_error,
            } => EngineError::RetriesExhausted {
                execution_id,
                attempts,
                last_error: last_error.to_string(),
            },
            RecoveryError::Cancelled {
                execution_id,
                attempts,
            } => EngineError::Cancelled {
                execution_id,
                attempts,
            },
            RecoveryError::Permanent {
                execution_id,
                error,
            } => EngineError::ExecutionFailed {
                execution_id,
                reason: error.to_string(),
            },
            other => EngineError::Recovery(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_recovery::ExecutionError;

    #[test]
    fn retryable_classification() {
        let transient = EngineError::Store(StoreError::Unavailable("down".into()));
        assert!(transient.is_retryable());

        let audit = EngineError::AuditWriteFailed {
            subject: "t-1".into(),
            reason: "sink down".into(),
            decision: None,
        };
        assert!(audit.is_retryable());

        let transition = EngineError::InvalidTransition {
            entity: "session",
            id: Uuid::new_v4(),
            from: "terminated".into(),
            to: "active".into(),
        };
        assert!(!transition.is_retryable());

        let incomplete = EngineError::IncompleteProposal {
            proposal_id: Uuid::new_v4(),
            missing: vec!["agent_id".into()],
        };
        assert!(!incomplete.is_retryable());
        assert!(!EngineError::ResolutionFailed { reason: "x".into() }.is_retryable());
    }

    #[test]
    fn supervision_errors_map_to_engine_taxonomy() {
        let id = Uuid::new_v4();
        let e: EngineError = SupervisionError::NotFound(id).into();
        assert!(matches!(e, EngineError::SessionNotFound(got) if got == id));

        let e: EngineError = SupervisionError::InvalidTransition {
            session_id: id,
            from: "terminated".into(),
            to: "terminated".into(),
        }
        .into();
        assert!(matches!(e, EngineError::InvalidTransition { entity: "session", .. }));
    }

    #[test]
    fn recovery_errors_map_to_engine_taxonomy() {
        let id = Uuid::new_v4();
        let e: EngineError = RecoveryError::Cancelled {
            execution_id: id,
            attempts: 1,
        }
        .into();
        assert!(matches!(e, EngineError::Cancelled { attempts: 1, .. }));

        let e: EngineError = RecoveryError::RetriesExhausted {
            execution_id: id,
            attempts: 3,
            last_error: ExecutionError::Network("reset".into()),
        }
        .into();
        assert!(matches!(e, EngineError::RetriesExhausted { attempts: 3, .. }));
    }
}
