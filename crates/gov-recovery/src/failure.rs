// failure.rs — Failure detection for in-flight executions.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    None,
    Timeout,
    Crash,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::None => write!(f, "none"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Crash => write!(f, "crash"),
            FailureKind::Network => write!(f, "network"),
        }
    }
}

/// Identity of an execution handed to the recovery manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionHandle {
    pub execution_id: Uuid,
    pub agent_id: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<Uuid>,
}

impl ExecutionHandle {
    pub fn new(agent_id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            action_type: action_type.into(),
            trigger_id: None,
        }
    }

    pub fn with_trigger(mut self, trigger_id: Uuid) -> Self {
        self.trigger_id = Some(trigger_id);
        self
    }
}

/// Snapshot of an execution that is currently being attempted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InFlightExecution {
    pub handle: ExecutionHandle,
    pub started_at: DateTime<Utc>,
    /// 1-based number of the current attempt.
    pub attempt: u32,
    pub attempt_started_at: DateTime<Utc>,
    /// What ended the previous attempt, if there was one.
    pub last_failure: FailureKind,
}

/// Classify the state of an in-flight execution at `now`.
///
/// An attempt running longer than `attempt_timeout` is a timeout; otherwise
/// the previous attempt's failure (or none) is reported.
pub fn detect_failure(
    execution: &InFlightExecution,
    now: DateTime<Utc>,
    attempt_timeout: Duration,
) -> FailureKind {
    if now.signed_duration_since(execution.attempt_started_at) > attempt_timeout {
        return FailureKind::Timeout;
    }
    execution.last_failure
}
