// sink.rs — The AuditSink capability and its bundled implementations.
//
// The engine never writes audit files directly; it hands records to an
// AuditSink. Deployments plug in whatever durable store they have. Two
// sinks ship here: the hash-chained JSONL file and an in-memory sink for
// tests and embedding.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AuditError;
use crate::log::AuditLog;
use crate::record::AuditRecord;

/// Outbound capability: durably write one audit record.
///
/// Implementations should return a transient error (`Unavailable`,
/// `WriteFailed`) when a retry could succeed; AuditTrail retries those.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// AuditSink backed by a hash-chained JSONL [`AuditLog`].
pub struct JsonlAuditSink {
    log: Mutex<AuditLog>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Ok(Self {
            log: Mutex::new(AuditLog::open(path)?),
        })
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut record = record.clone();
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.append(&mut record)
    }
}

/// In-memory AuditSink that keeps every record in write order.
///
/// `failing(n)` makes the next `n` writes fail with `Unavailable`, which is
/// how retry behaviour is exercised without a real flaky backend.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failures_remaining: AtomicU32,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose next `n` writes fail transiently.
    pub fn failing(n: u32) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failures_remaining: AtomicU32::new(n),
        }
    }

    /// Make the next `n` writes fail transiently.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Snapshot of all records written so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AuditError::Unavailable("injected failure".to_string()));
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditAction;
    use tempfile::tempdir;

    #[tokio::test]
    async fn jsonl_sink_writes_chained_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::open(&path).unwrap();

        sink.write(&AuditRecord::new("a", AuditAction::TriggerDecision))
            .await
            .unwrap();
        sink.write(&AuditRecord::new("a", AuditAction::ExecutionOutcome))
            .await
            .unwrap();

        assert_eq!(AuditLog::verify_chain(&path).unwrap(), 2);
    }

    #[tokio::test]
    async fn memory_sink_injected_failures_then_success() {
        let sink = MemoryAuditSink::failing(2);
        let record = AuditRecord::new("a", AuditAction::TriggerDecision);

        assert!(sink.write(&record).await.is_err());
        assert!(sink.write(&record).await.is_err());
        assert!(sink.write(&record).await.is_ok());
        assert_eq!(sink.len(), 1);
    }
}
