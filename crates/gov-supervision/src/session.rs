// session.rs — SupervisionSession and its state machine.
//
// Valid transitions:
//   Active → Paused → Corrected → Active   (repeatable)
//   Active → Corrected → Active
//   Paused → Active
//   Active | Paused | Corrected → Terminated
//   Active → Completed
//
// Terminated and Completed are terminal. Corrected means one intervention
// is open; another correction has to wait for the resume that resolves it.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use gov_policy::MaturityLevel;
use gov_store::Record;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SupervisionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Paused,
    Corrected,
    Terminated,
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Corrected => write!(f, "corrected"),
            SessionState::Terminated => write!(f, "terminated"),
            SessionState::Completed => write!(f, "completed"),
        }
    }
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Completed)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Active, Paused)
                | (Active, Corrected)
                | (Paused, Corrected)
                | (Corrected, Active)
                | (Paused, Active)
                | (Active, Terminated)
                | (Paused, Terminated)
                | (Corrected, Terminated)
                | (Active, Completed)
        )
    }
}

/// A correction supplied by the supervising human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Correction {
    pub by: String,
    pub description: String,
}

impl Correction {
    pub fn new(by: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            by: by.into(),
            description: description.into(),
        }
    }
}

/// One entry in a session's intervention log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intervention {
    pub intervention_id: Uuid,
    pub by: String,
    pub description: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisionSession {
    pub session_id: Uuid,
    pub agent_id: String,
    /// The trigger whose action runs under this session.
    pub trigger_id: Uuid,
    pub action_type: String,
    /// Agent tier when supervision started.
    pub maturity: MaturityLevel,
    pub state: SessionState,
    /// Ordered intervention log.
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Past this instant a non-terminal session is terminated by the sweeper.
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
}

impl SupervisionSession {
    pub fn new(
        agent_id: impl Into<String>,
        trigger_id: Uuid,
        action_type: impl Into<String>,
        maturity: MaturityLevel,
        timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            trigger_id,
            action_type: action_type.into(),
            maturity,
            state: SessionState::Active,
            interventions: Vec::new(),
            started_at: now,
            updated_at: now,
            expires_at: now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC),
            ended_by: None,
            end_reason: None,
        }
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), SupervisionError> {
        if !self.state.can_transition_to(next) {
            return Err(SupervisionError::InvalidTransition {
                session_id: self.session_id,
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The unresolved intervention, if any. At most one exists.
    pub fn open_intervention(&self) -> Option<&Intervention> {
        self.interventions.iter().find(|i| i.resolved_at.is_none())
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl Record for SupervisionSession {
    fn record_id(&self) -> String {
        self.session_id.to_string()
    }
}
