// executor.rs — The outbound Executor capability.
//
// The engine decides whether an action may run; performing it belongs to
// whoever embeds the engine. Every attempt goes through the recovery
// manager, which supplies the checkpoint to resume from.

use async_trait::async_trait;
use gov_recovery::{AttemptContext, ExecutionError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// An action cleared to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRequest {
    pub agent_id: String,
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<Uuid>,
    /// Set when the action runs because a proposal was approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<Uuid>,
    /// Set when the action runs under live supervision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// True for MANUAL_WARN: a human forced the action past the agent's tier.
    #[serde(default)]
    pub warning: bool,
}

impl ActionRequest {
    pub fn new(agent_id: impl Into<String>, action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            agent_id: agent_id.into(),
            action_type: action_type.into(),
            payload,
            trigger_id: None,
            proposal_id: None,
            session_id: None,
            warning: false,
        }
    }
}

/// Performs approved actions.
///
/// Return `ExecutionError::Rejected` for failures no retry can fix; the
/// other variants are retried per the recovery policy.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, action: &ActionRequest, ctx: AttemptContext) -> Result<Value, ExecutionError>;
}

/// Executor that performs nothing and logs what it was asked to do.
///
/// Used by the CLI, where real side effects live outside the process.
#[derive(Debug, Default, Clone)]
pub struct LoggingExecutor;

#[async_trait]
impl Executor for LoggingExecutor {
    async fn run(&self, action: &ActionRequest, ctx: AttemptContext) -> Result<Value, ExecutionError> {
        tracing::info!(
            execution_id = %ctx.execution_id,
            attempt = ctx.attempt,
            agent_id = %action.agent_id,
            action_type = %action.action_type,
            warning = action.warning,
            "action handed off"
        );
        Ok(json!({
            "status": "accepted",
            "action_type": action.action_type,
            "attempt": ctx.attempt,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_recovery::{Checkpointer, MemoryCheckpointStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn logging_executor_accepts() {
        let execution_id = Uuid::new_v4();
        let ctx = AttemptContext {
            execution_id,
            attempt: 1,
            resume_from: None,
            checkpointer: Checkpointer::new(Arc::new(MemoryCheckpointStore::new()), execution_id),
        };
        let out = LoggingExecutor
            .run(&ActionRequest::new("a-1", "read_data", Value::Null), ctx)
            .await
            .unwrap();
        assert_eq!(out["status"], "accepted");
        assert_eq!(out["attempt"], 1);
    }
}
