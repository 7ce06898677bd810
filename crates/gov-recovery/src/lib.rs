//! # gov-recovery
//!
//! Keeps executions recoverable: append-only [`Checkpoint`]s, failure
//! detection, and a bounded, cancellable retry loop with exponential
//! backoff driven by an explicit [`RetrySchedule`].

pub mod checkpoint;
pub mod error;
pub mod failure;
pub mod manager;
pub mod retry;

pub use checkpoint::{
    Checkpoint, CheckpointStore, Checkpointer, JsonlCheckpointStore, MemoryCheckpointStore,
};
pub use error::{ExecutionError, RecoveryError};
pub use failure::{detect_failure, ExecutionHandle, FailureKind, InFlightExecution};
pub use manager::{AttemptContext, ExecutionReport, RecoveryManager};
pub use retry::{Attempt, RetryPolicy, RetrySchedule};
