// trigger.rs — Triggers and the decisions routing produces for them.
//
// A Trigger is one attempted action. It is consumed once; re-submitting the
// same trigger id returns the stored TriggerDecision unchanged.

use std::fmt;

use chrono::{DateTime, Utc};
use gov_audit::RequestContext;
use gov_policy::{ComplexityTier, MaturityLevel, Violation};
use gov_store::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    /// Fired by the agent or a schedule without a human in the loop.
    Automated,
    /// Explicitly requested by a human.
    Manual,
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerOrigin::Automated => write!(f, "automated"),
            TriggerOrigin::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for TriggerOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "automated" => Ok(TriggerOrigin::Automated),
            "manual" => Ok(TriggerOrigin::Manual),
            other => Err(format!("unknown trigger origin '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    pub trigger_id: Uuid,
    pub origin: TriggerOrigin,
    pub action_type: String,
    /// Action parameters: a JSON object, or null for none.
    #[serde(default)]
    pub payload: Value,
    /// Explicitly requested agent. Must exist if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Caller session, used for session-bound agent fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub workspace_id: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<RequestContext>,
}

impl Trigger {
    pub fn new(
        origin: TriggerOrigin,
        action_type: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            trigger_id: Uuid::new_v4(),
            origin,
            action_type: action_type.into(),
            payload: Value::Null,
            agent_id: None,
            session_id: None,
            workspace_id: workspace_id.into(),
            requested_at: Utc::now(),
            caller: None,
        }
    }

    pub fn automated(action_type: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self::new(TriggerOrigin::Automated, action_type, workspace_id)
    }

    pub fn manual(action_type: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self::new(TriggerOrigin::Manual, action_type, workspace_id)
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_caller(mut self, caller: RequestContext) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Structural checks run before anything else touches the trigger.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.action_type.trim().is_empty() {
            return Err(EngineError::InvalidTrigger {
                reason: "action_type is empty".to_string(),
            });
        }
        if self.workspace_id.trim().is_empty() {
            return Err(EngineError::InvalidTrigger {
                reason: "workspace_id is empty".to_string(),
            });
        }
        if let Some(agent_id) = &self.agent_id {
            if agent_id.trim().is_empty() {
                return Err(EngineError::InvalidTrigger {
                    reason: "agent_id is present but empty".to_string(),
                });
            }
        }
        if !(self.payload.is_object() || self.payload.is_null()) {
            return Err(EngineError::InvalidTrigger {
                reason: "payload must be a JSON object or null".to_string(),
            });
        }
        Ok(())
    }

    /// Request context for audit records, defaulting the session field.
    pub fn request_context(&self) -> RequestContext {
        let mut ctx = self.caller.clone().unwrap_or_default();
        if ctx.session_id.is_none() {
            ctx.session_id = self.session_id.clone();
        }
        ctx
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingDecision {
    BlockToTraining,
    CreateProposal,
    Supervise,
    Execute,
    ManualWarn,
}

impl RoutingDecision {
    /// Whether this decision hands the action to the executor right away.
    pub fn executes_inline(&self) -> bool {
        matches!(self, RoutingDecision::Execute | RoutingDecision::ManualWarn)
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingDecision::BlockToTraining => write!(f, "block_to_training"),
            RoutingDecision::CreateProposal => write!(f, "create_proposal"),
            RoutingDecision::Supervise => write!(f, "supervise"),
            RoutingDecision::Execute => write!(f, "execute"),
            RoutingDecision::ManualWarn => write!(f, "manual_warn"),
        }
    }
}

/// One check on the way to a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionStep {
    pub check: String,
    pub outcome: String,
}

impl DecisionStep {
    pub fn new(check: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            outcome: outcome.into(),
        }
    }
}

/// The routed outcome for one trigger. Keyed by trigger id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerDecision {
    pub trigger_id: Uuid,
    pub agent_id: String,
    pub action_type: String,
    pub origin: TriggerOrigin,
    /// Tier and complexity as resolved at decision time.
    pub maturity: MaturityLevel,
    pub complexity: ComplexityTier,
    pub decision: RoutingDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Constitutional violation that redirected an execution to a proposal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<Violation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Violation>,
    #[serde(default)]
    pub trace: Vec<DecisionStep>,
    /// Id of the audit record for this decision. None until it is written.
    #[serde(default)]
    pub audit_event_id: Option<Uuid>,
    pub decided_at: DateTime<Utc>,
}

impl TriggerDecision {
    pub fn is_audited(&self) -> bool {
        self.audit_event_id.is_some()
    }

    /// Human-readable explanation of the decision.
    pub fn summary(&self) -> String {
        match self.decision {
            RoutingDecision::BlockToTraining => format!(
                "{} is {} and may not run '{}' unattended; training proposal {} created",
                self.agent_id,
                self.maturity,
                self.action_type,
                self.proposal_id.map_or_else(|| "-".to_string(), |id| id.to_string())
            ),
            RoutingDecision::CreateProposal => match &self.violation {
                Some(v) => format!(
                    "'{}' violates rule {} ({}); deferred to proposal {}",
                    self.action_type,
                    v.rule_id,
                    v.reason,
                    self.proposal_id.map_or_else(|| "-".to_string(), |id| id.to_string())
                ),
                None => format!(
                    "'{}' by {} ({}) awaits approval as proposal {}",
                    self.action_type,
                    self.agent_id,
                    self.maturity,
                    self.proposal_id.map_or_else(|| "-".to_string(), |id| id.to_string())
                ),
            },
            RoutingDecision::Supervise => format!(
                "'{}' ({}) runs under supervision session {}",
                self.action_type,
                self.complexity,
                self.session_id.map_or_else(|| "-".to_string(), |id| id.to_string())
            ),
            RoutingDecision::Execute => {
                format!("'{}' executed for {} ({})", self.action_type, self.agent_id, self.maturity)
            }
            RoutingDecision::ManualWarn => format!(
                "'{}' executed on manual request despite {} being {}",
                self.action_type, self.agent_id, self.maturity
            ),
        }
    }
}

impl Record for TriggerDecision {
    fn record_id(&self) -> String {
        self.trigger_id.to_string()
    }
}
