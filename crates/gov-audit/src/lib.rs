//! # gov-audit
//!
//! Append-only audit trail for the agent governance engine.
//!
//! Every routing decision, proposal resolution, supervision transition,
//! graduation, and execution outcome is recorded as an [`AuditRecord`].
//! Records are written through the [`AuditSink`] capability; the
//! [`AuditTrail`] wraps a sink with bounded retry on transient failures.
//!
//! The bundled [`JsonlAuditSink`] stores records in a JSONL file where each
//! line carries the SHA-256 of the previous line, so tampering (inserting,
//! deleting, or editing records) is detectable with
//! [`AuditLog::verify_chain`].
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use gov_audit::{AuditAction, AuditLog, AuditRecord};
//!
//! let mut log = AuditLog::open("/tmp/audit.jsonl").unwrap();
//! let mut record = AuditRecord::new("agent-1", AuditAction::TriggerDecision)
//!     .with_subject("trigger-42")
//!     .with_outcome("executed");
//! log.append(&mut record).unwrap();
//! ```

pub mod error;
pub mod hasher;
pub mod log;
pub mod record;
pub mod sink;
pub mod trail;

pub use error::AuditError;
pub use log::AuditLog;
pub use record::{AuditAction, AuditRecord, RequestContext};
pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use trail::{AuditReceipt, AuditRetryPolicy, AuditTrail};
