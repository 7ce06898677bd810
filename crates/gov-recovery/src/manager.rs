// manager.rs — Execution Recovery Manager.
//
// Drives an execution through its retry schedule. Before every attempt the
// latest checkpoint is restored and handed to the attempt, so a retry picks
// up from the last durable progress point instead of the beginning. The
// loop honors a caller-supplied CancellationToken both while backing off
// and while an attempt is running.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointStore, Checkpointer};
use crate::error::{ExecutionError, RecoveryError};
use crate::failure::{detect_failure, ExecutionHandle, FailureKind, InFlightExecution};
use crate::retry::{RetryPolicy, RetrySchedule};

/// Everything one attempt needs.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub execution_id: Uuid,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Latest checkpoint at attempt start. None means start from scratch.
    pub resume_from: Option<Checkpoint>,
    pub checkpointer: Checkpointer,
}

/// A successful execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub attempts: u32,
    pub output: Value,
    /// Sequence of the checkpoint the final attempt resumed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<u64>,
    pub finished_at: DateTime<Utc>,
}

pub struct RecoveryManager {
    checkpoints: Arc<dyn CheckpointStore>,
    in_flight: Mutex<HashMap<Uuid, InFlightExecution>>,
}

impl RecoveryManager {
    pub fn new(checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            checkpoints,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn save_checkpoint(
        &self,
        execution_id: Uuid,
        state: Value,
    ) -> Result<Checkpoint, RecoveryError> {
        let checkpoint = self.checkpoints.append(execution_id, state)?;
        tracing::debug!(%execution_id, sequence = checkpoint.sequence, "checkpoint saved");
        Ok(checkpoint)
    }

    /// State of the latest checkpoint, or `NoCheckpoint`.
    pub fn restore_state(&self, execution_id: Uuid) -> Result<Value, RecoveryError> {
        self.checkpoints
            .latest(execution_id)?
            .map(|c| c.state)
            .ok_or(RecoveryError::NoCheckpoint(execution_id))
    }

    /// Failure state of a tracked execution. Untracked executions report none.
    pub fn detect_failure(
        &self,
        execution_id: Uuid,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> FailureKind {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        match in_flight.get(&execution_id) {
            Some(execution) => detect_failure(
                execution,
                now,
                ChronoDuration::try_seconds(i64::try_from(policy.attempt_timeout_secs).unwrap_or(i64::MAX))
                    .unwrap_or_else(|| ChronoDuration::days(365 * 10_000)),
            ),
            None => FailureKind::None,
        }
    }

    /// Executions currently being attempted, optionally for one agent.
    pub fn in_flight(&self, agent_id: Option<&str>) -> Vec<InFlightExecution> {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = in_flight
            .values()
            .filter(|e| agent_id.map_or(true, |a| e.handle.agent_id == a))
            .cloned()
            .collect();
        list.sort_by_key(|e| e.started_at);
        list
    }

    fn mark_attempt(&self, handle: &ExecutionHandle, attempt: u32, last_failure: FailureKind) {
        let now = Utc::now();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let entry = in_flight
            .entry(handle.execution_id)
            .or_insert_with(|| InFlightExecution {
                handle: handle.clone(),
                started_at: now,
                attempt,
                attempt_started_at: now,
                last_failure,
            });
        entry.attempt = attempt;
        entry.attempt_started_at = now;
        entry.last_failure = last_failure;
    }

    fn untrack(&self, execution_id: Uuid) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&execution_id);
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts,
    /// or `cancel` fires.
    pub async fn retry<F, Fut>(
        &self,
        handle: &ExecutionHandle,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<ExecutionReport, RecoveryError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<Value, ExecutionError>>,
    {
        let result = self.run_schedule(handle, policy, cancel, op).await;
        self.untrack(handle.execution_id);
        result
    }

    async fn run_schedule<F, Fut>(
        &self,
        handle: &ExecutionHandle,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<ExecutionReport, RecoveryError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<Value, ExecutionError>>,
    {
        let execution_id = handle.execution_id;
        let mut schedule = RetrySchedule::new(policy.clone());
        let mut last_error: Option<ExecutionError> = None;

        while let Some(attempt) = schedule.next_attempt() {
            let completed = attempt.number - 1;
            if !attempt.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(RecoveryError::Cancelled { execution_id, attempts: completed });
                    }
                    _ = tokio::time::sleep(attempt.delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return Err(RecoveryError::Cancelled {
                    execution_id,
                    attempts: completed,
                });
            }

            let resume_from = match self.checkpoints.latest(execution_id) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(%execution_id, error = %e, "checkpoint restore failed, restarting from the beginning");
                    None
                }
            };
            let resumed_from = resume_from.as_ref().map(|c| c.sequence);
            self.mark_attempt(
                handle,
                attempt.number,
                last_error.as_ref().map_or(FailureKind::None, |e| e.kind()),
            );

            let ctx = AttemptContext {
                execution_id,
                attempt: attempt.number,
                resume_from,
                checkpointer: Checkpointer::new(self.checkpoints.clone(), execution_id),
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RecoveryError::Cancelled { execution_id, attempts: attempt.number });
                }
                r = tokio::time::timeout(policy.attempt_timeout(), op(ctx)) => match r {
                    Ok(r) => r,
                    Err(_) => Err(ExecutionError::Timeout { secs: policy.attempt_timeout_secs }),
                },
            };

            match outcome {
                Ok(output) => {
                    return Ok(ExecutionReport {
                        execution_id,
                        attempts: attempt.number,
                        output,
                        resumed_from,
                        finished_at: Utc::now(),
                    });
                }
                Err(error) if !error.is_retryable() => {
                    tracing::warn!(%execution_id, %error, "execution failed permanently");
                    return Err(RecoveryError::Permanent { execution_id, error });
                }
                Err(error) => {
                    tracing::warn!(
                        %execution_id,
                        attempt = attempt.number,
                        max_attempts = policy.max_attempts,
                        failure = %error.kind(),
                        %error,
                        "execution attempt failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        let attempts = schedule.attempts();
        let last_error = last_error
            .unwrap_or_else(|| ExecutionError::Crash("no attempt completed".to_string()));
        tracing::error!(%execution_id, attempts, %last_error, "execution retries exhausted");
        Err(RecoveryError::RetriesExhausted {
            execution_id,
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn manager() -> RecoveryManager {
        RecoveryManager::new(Arc::new(MemoryCheckpointStore::new()))
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
            jitter_ratio: 0.0,
            attempt_timeout_secs: 5,
        }
    }

    #[test]
    fn save_then_restore_round_trips() {
        let m = manager();
        let id = Uuid::new_v4();
        let state = json!({"cursor": 42, "done": ["a", "b"]});
        m.save_checkpoint(id, state.clone()).unwrap();
        assert_eq!(m.restore_state(id).unwrap(), state);
    }

    #[test]
    fn restore_without_checkpoint() {
        let m = manager();
        let id = Uuid::new_v4();
        assert!(matches!(m.restore_state(id), Err(RecoveryError::NoCheckpoint(x)) if x == id));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let m = manager();
        let handle = ExecutionHandle::new("agent-1", "deploy");
        let calls = AtomicU32::new(0);

        let report = m
            .retry(&handle, &fast(3), &CancellationToken::new(), |ctx| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ExecutionError::Network("reset".into()))
                    } else {
                        Ok(json!({"attempt": ctx.attempt}))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.output, json!({"attempt": 3}));
        assert!(m.in_flight(None).is_empty());
    }

    #[tokio::test]
    async fn bounded_attempts_then_exhausted() {
        let m = manager();
        let handle = ExecutionHandle::new("agent-1", "deploy");
        let calls = AtomicU32::new(0);

        let err = m
            .retry(&handle, &fast(3), &CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExecutionError::Crash("boom".into())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            RecoveryError::RetriesExhausted { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, ExecutionError::Crash("boom".into()));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejected_is_not_retried() {
        let m = manager();
        let calls = AtomicU32::new(0);
        let err = m
            .retry(
                &ExecutionHandle::new("agent-1", "deploy"),
                &fast(5),
                &CancellationToken::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ExecutionError::Rejected("policy".into())) }
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::Permanent { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_wins_over_exhaustion() {
        let m = manager();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = m
            .retry(
                &ExecutionHandle::new("agent-1", "deploy"),
                &fast(3),
                &cancel,
                |_| std::future::pending::<Result<Value, ExecutionError>>(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::Cancelled { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn already_cancelled_makes_no_attempt() {
        let m = manager();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let err = m
            .retry(&ExecutionHandle::new("a", "deploy"), &fast(3), &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!(null)) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::Cancelled { attempts: 0, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_resume_from_latest_checkpoint() {
        let m = manager();
        let handle = ExecutionHandle::new("agent-1", "migrate");

        let report = m
            .retry(&handle, &fast(3), &CancellationToken::new(), |ctx| async move {
                match ctx.resume_from {
                    None => {
                        if let Err(e) = ctx.checkpointer.save(json!({"rows_done": 500})) {
                            return Err(ExecutionError::Crash(e.to_string()));
                        }
                        Err(ExecutionError::Crash("worker died".into()))
                    }
                    Some(checkpoint) => Ok(checkpoint.state),
                }
            })
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.resumed_from, Some(1));
        assert_eq!(report.output, json!({"rows_done": 500}));
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let m = manager();
        let policy = RetryPolicy {
            attempt_timeout_secs: 0,
            ..fast(2)
        };
        let err = m
            .retry(
                &ExecutionHandle::new("a", "deploy"),
                &policy,
                &CancellationToken::new(),
                |_| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(json!(null))
                },
            )
            .await
            .unwrap_err();
        match err {
            RecoveryError::RetriesExhausted { last_error, .. } => {
                assert_eq!(last_error.kind(), FailureKind::Timeout)
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }
}
