//! # gov-store
//!
//! Record persistence for the agent governance engine.
//!
//! Agents, proposals, supervision sessions, and trigger decisions are all
//! independently addressable records keyed by a string identifier. The
//! [`RecordStore`] trait is the persistence boundary; the engine never
//! depends on a concrete backend.
//!
//! ## Key components
//!
//! - [`Record`] — implemented by every persisted type to expose its key.
//! - [`RecordStore`] — trait abstracting record persistence.
//! - [`MemoryStore`] — in-process backend used by tests and embedders.
//! - [`JsonDirStore`] — one pretty-printed JSON file per record, survives
//!   process restarts and is easy to inspect by hand.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{JsonDirStore, MemoryStore, Record, RecordStore};
