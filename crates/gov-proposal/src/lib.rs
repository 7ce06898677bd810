//! # gov-proposal
//!
//! Deferred work awaiting a human: training proposals for agents that are
//! not yet cleared to act, and action proposals for actions that need sign-off.
//!
//! A [`Proposal`] is created `pending` and resolved exactly once: approved,
//! rejected, or expired by the background sweep. The [`ProposalEvaluator`]
//! validates required fields before it scores anything, ranks proposals by
//! risk, and decides whether an approval may go through.

pub mod error;
pub mod evaluator;
pub mod proposal;
pub mod sweep;

pub use error::ProposalError;
pub use evaluator::{ApprovalCheck, ProposalEvaluator};
pub use proposal::{Proposal, ProposalKind, ProposalStatus, Resolution};
pub use sweep::{expire_pending, pending};
