// proposal.rs — Proposal: a deferred training or action request.
//
// Lifecycle:
//   Pending → Approved | Rejected | Expired
//
// Resolution happens once. A resolved proposal is immutable; every further
// transition is rejected with InvalidTransition.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use gov_policy::MaturityLevel;
use gov_store::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ProposalError;

/// What the proposal asks for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalKind {
    /// The agent needs training before it may act on its own.
    Training {
        target_maturity: MaturityLevel,
        /// The action whose attempt produced this proposal, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blocked_action: Option<String>,
        reason: String,
    },
    /// A concrete action waiting for human approval.
    Action { action_type: String, payload: Value },
}

impl ProposalKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProposalKind::Training { .. } => "training",
            ProposalKind::Action { .. } => "action",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalStatus::Pending => write!(f, "pending"),
            ProposalStatus::Approved => write!(f, "approved"),
            ProposalStatus::Rejected => write!(f, "rejected"),
            ProposalStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Who resolved a proposal, when, and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub by: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub proposal_id: Uuid,

    #[serde(flatten)]
    pub kind: ProposalKind,

    /// The requesting agent.
    pub agent_id: String,

    /// The trigger that produced this proposal, when routed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<Uuid>,

    pub description: String,

    /// Risk in [0, 1], set by the evaluator.
    #[serde(default)]
    pub risk_score: Option<f64>,

    /// The agent's confidence score when the proposal was created.
    #[serde(default)]
    pub confidence: Option<f64>,

    pub status: ProposalStatus,

    pub created_at: DateTime<Utc>,

    /// After this instant a pending proposal is swept to Expired.
    pub expires_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl Proposal {
    fn new(agent_id: impl Into<String>, kind: ProposalKind, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            proposal_id: Uuid::new_v4(),
            kind,
            agent_id: agent_id.into(),
            trigger_id: None,
            description: String::new(),
            risk_score: None,
            confidence: None,
            status: ProposalStatus::Pending,
            created_at: now,
            expires_at: now.checked_add_signed(expires_in).unwrap_or(DateTime::<Utc>::MAX_UTC),
            resolution: None,
        }
    }

    /// A training proposal raising the agent toward `target_maturity`.
    pub fn training(
        agent_id: impl Into<String>,
        target_maturity: MaturityLevel,
        reason: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        let reason = reason.into();
        let mut proposal = Self::new(
            agent_id,
            ProposalKind::Training {
                target_maturity,
                blocked_action: None,
                reason: reason.clone(),
            },
            expires_in,
        );
        proposal.description = reason;
        proposal
    }

    /// An action proposal deferring `action_type` to a human.
    pub fn action(
        agent_id: impl Into<String>,
        action_type: impl Into<String>,
        payload: Value,
        expires_in: Duration,
    ) -> Self {
        let action_type = action_type.into();
        let mut proposal = Self::new(
            agent_id,
            ProposalKind::Action {
                action_type: action_type.clone(),
                payload,
            },
            expires_in,
        );
        proposal.description = format!("Approve action '{}'", action_type);
        proposal
    }

    pub fn with_trigger(mut self, trigger_id: Uuid) -> Self {
        self.trigger_id = Some(trigger_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }

    /// Builder for training proposals: record which action was blocked.
    pub fn with_blocked_action(mut self, action: impl Into<String>) -> Self {
        if let ProposalKind::Training { blocked_action, .. } = &mut self.kind {
            *blocked_action = Some(action.into());
        }
        self
    }

    /// The action type this proposal concerns: the requested action, or the
    /// blocked one for training proposals.
    pub fn action_type(&self) -> Option<&str> {
        match &self.kind {
            ProposalKind::Action { action_type, .. } => Some(action_type),
            ProposalKind::Training { blocked_action, .. } => blocked_action.as_deref(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn resolve(
        &mut self,
        status: ProposalStatus,
        by: impl Into<String>,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<(), ProposalError> {
        if self.status != ProposalStatus::Pending {
            return Err(ProposalError::InvalidTransition {
                proposal_id: self.proposal_id,
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.resolution = Some(Resolution {
            by: by.into(),
            at,
            reason,
        });
        Ok(())
    }

    pub fn approve(&mut self, approver: impl Into<String>) -> Result<(), ProposalError> {
        self.resolve(ProposalStatus::Approved, approver, Utc::now(), None)
    }

    pub fn reject(
        &mut self,
        approver: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<(), ProposalError> {
        self.resolve(
            ProposalStatus::Rejected,
            approver,
            Utc::now(),
            Some(reason.into()),
        )
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), ProposalError> {
        self.resolve(
            ProposalStatus::Expired,
            "system",
            now,
            Some("approval window elapsed".to_string()),
        )
    }
}

impl Record for Proposal {
    fn record_id(&self) -> String {
        self.proposal_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_proposals_are_pending() {
        let p = Proposal::action("agent-1", "send_email", json!({"to": "x"}), Duration::hours(24));
        assert!(p.is_pending());
        assert_eq!(p.action_type(), Some("send_email"));
        assert!(p.expires_at > p.created_at);
    }

    #[test]
    fn oversized_expiry_saturates() {
        let far = Duration::try_days(100_000_000).unwrap();
        let p = Proposal::action("agent-1", "deploy", json!({}), far);
        assert_eq!(p.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!p.is_past_expiry(Utc::now()));
    }

    #[test]
    fn resolution_happens_once() {
        let mut p = Proposal::action("agent-1", "deploy", json!({}), Duration::hours(1));
        p.approve("alice").unwrap();
        assert_eq!(p.status, ProposalStatus::Approved);
        assert_eq!(p.resolution.as_ref().unwrap().by, "alice");

        let err = p.reject("bob", "changed my mind").unwrap_err();
        assert!(matches!(err, ProposalError::InvalidTransition { .. }));
        assert_eq!(p.status, ProposalStatus::Approved);
        assert!(p.expire(Utc::now()).is_err());
    }

    #[test]
    fn training_records_blocked_action() {
        let p = Proposal::training(
            "agent-1",
            MaturityLevel::Intern,
            "Agent is not cleared for automated send_email",
            Duration::hours(24),
        )
        .with_blocked_action("send_email");
        assert_eq!(p.action_type(), Some("send_email"));
        assert_eq!(p.kind.label(), "training");
    }

    #[test]
    fn serialized_kind_is_tagged() {
        let p = Proposal::action("agent-1", "deploy", json!({"env": "prod"}), Duration::hours(1));
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["kind"], "action");
        assert_eq!(value["action_type"], "deploy");
        assert_eq!(value["status"], "pending");

        let restored: Proposal = serde_json::from_value(value).unwrap();
        assert_eq!(restored, p);
    }
}
