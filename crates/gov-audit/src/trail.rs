// trail.rs — Retry-on-write wrapper around an AuditSink.
//
// Transient sink failures are retried with a doubling delay up to
// `max_retries` extra attempts. Anything left over is surfaced as
// `RetriesExhausted` and logged at error level. The caller decides what a
// failed audit means; governance decisions are never rolled back here.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;
use crate::record::AuditRecord;
use crate::sink::AuditSink;

/// Bounded retry settings for audit writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRetryPolicy {
    /// Extra attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    50
}

impl Default for AuditRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Proof that a record reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub record_id: Uuid,
    pub retry_count: u32,
}

/// The audit trail used by every engine component.
#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Write a record, retrying transient failures per `policy`.
    ///
    /// `retry_count` on the stored record reflects the attempts it took.
    pub async fn record(
        &self,
        mut record: AuditRecord,
        policy: &AuditRetryPolicy,
    ) -> Result<AuditReceipt, AuditError> {
        let mut attempt: u32 = 0;
        loop {
            record.retry_count = attempt;
            match self.sink.write(&record).await {
                Ok(()) => {
                    return Ok(AuditReceipt {
                        record_id: record.record_id,
                        retry_count: attempt,
                    })
                }
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    let delay = policy
                        .retry_delay_ms
                        .saturating_mul(1u64 << attempt.min(16));
                    tracing::warn!(
                        record_id = %record.record_id,
                        action = %record.action,
                        attempt = attempt + 1,
                        error = %e,
                        "audit write failed, retrying in {}ms",
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        record_id = %record.record_id,
                        action = %record.action,
                        actor = %record.actor,
                        attempts = attempt + 1,
                        error = %e,
                        "AUDIT WRITE FAILED: governance event is unrecorded"
                    );
                    return Err(AuditError::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}
