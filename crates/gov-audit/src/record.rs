// record.rs — Audit record data model.
//
// One AuditRecord is written per governance decision or state transition.
// Records are append-only: nothing in the engine ever edits a written
// record. Each record names the actor, the action, a before/after state
// summary, the outcome, how many write attempts it took, and the request
// context it was made under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of governance event this record captures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// The Trigger Router produced a decision (block, propose, supervise, execute).
    TriggerDecision,
    /// A STUDENT agent's manual trigger executed with a warning.
    ManualOverride,
    /// A human approved a proposal.
    ProposalApproved,
    /// A human rejected a proposal.
    ProposalRejected,
    /// The sweeper expired a pending proposal.
    ProposalExpired,
    /// A supervisor paused a session.
    SupervisionPaused,
    /// A supervisor applied a correction.
    SupervisionIntervention,
    /// A corrected or paused session went back to active.
    SupervisionResumed,
    /// A session was terminated (by a supervisor, failure, or expiry).
    SupervisionTerminated,
    /// A supervised execution finished normally.
    SupervisionCompleted,
    /// An execution finished, failed, or was cancelled.
    ExecutionOutcome,
    /// An agent graduated to a higher maturity tier.
    Graduation,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuditAction::TriggerDecision => "trigger_decision",
            AuditAction::ManualOverride => "manual_override",
            AuditAction::ProposalApproved => "proposal_approved",
            AuditAction::ProposalRejected => "proposal_rejected",
            AuditAction::ProposalExpired => "proposal_expired",
            AuditAction::SupervisionPaused => "supervision_paused",
            AuditAction::SupervisionIntervention => "supervision_intervention",
            AuditAction::SupervisionResumed => "supervision_resumed",
            AuditAction::SupervisionTerminated => "supervision_terminated",
            AuditAction::SupervisionCompleted => "supervision_completed",
            AuditAction::ExecutionOutcome => "execution_outcome",
            AuditAction::Graduation => "graduation",
        };
        f.write_str(name)
    }
}

/// Where a request came from, as far as the engine can tell.
///
/// Authentication happens upstream; these fields are recorded verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestContext {
    /// Caller network address, if the transport supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_ip: Option<String>,
    /// Caller user agent or client identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_agent: Option<String>,
    /// Conversation/session the request belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// A single audit record: one line in the JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier for this record.
    pub record_id: Uuid,

    /// When the audited event happened (UTC).
    pub timestamp: DateTime<Utc>,

    /// Who acted: an agent id for routing, a human id for approvals.
    pub actor: String,

    /// What kind of event this is.
    pub action: AuditAction,

    /// The thing acted on (trigger, proposal, session, or execution id).
    pub subject: Option<String>,

    /// State summary before the event (e.g., "pending", "intern").
    pub before_state: Option<String>,

    /// State summary after the event.
    pub after_state: Option<String>,

    /// Outcome label (e.g., "block_to_training", "approved", "retries_exhausted").
    pub outcome: String,

    /// How many failed write attempts preceded the successful one.
    #[serde(default)]
    pub retry_count: u32,

    /// Request origin details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_context: Option<RequestContext>,

    /// Hash of the previous record in the log (tamper detection).
    /// The first record in a log has this set to None.
    pub previous_hash: Option<String>,

    /// Arbitrary additional data.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditRecord {
    /// Create a new record with the current timestamp and a random id.
    pub fn new(actor: impl Into<String>, action: AuditAction) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            subject: None,
            before_state: None,
            after_state: None,
            outcome: String::new(),
            retry_count: 0,
            request_context: None,
            previous_hash: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Record the before/after state summary.
    pub fn with_transition(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before_state = Some(before.into());
        self.after_state = Some(after.into());
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn with_context(mut self, context: Option<RequestContext>) -> Self {
        self.request_context = context;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
