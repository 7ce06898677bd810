//! # gov-policy
//!
//! Classification and constitutional checks for the agent governance engine.
//!
//! Everything here is deterministic: the same inputs always produce the
//! same verdict. Uncertainty resolves to the most restrictive answer.
//!
//! ## Key invariants
//!
//! - **Maturity is derived**: an agent's [`MaturityLevel`] is always a pure
//!   function of its confidence score. A missing score means STUDENT.
//! - **Unknown actions are critical**: the [`ComplexityRegistry`] classifies
//!   unregistered action types as CRITICAL.
//! - **No stale tiers after graduation**: [`GovernanceCache`] population is
//!   compare-and-set on a per-agent generation that every invalidation bumps.
//! - **Constitutional checks fail closed**: a malformed rule counts as a
//!   violation, never as a pass.

pub mod agent;
pub mod cache;
pub mod complexity;
pub mod constitution;
pub mod error;
pub mod history;
pub mod maturity;

pub use agent::{Agent, MaturityLevel};
pub use cache::{CacheEntry, CacheLookup, GovernanceCache};
pub use complexity::{ActionProfile, ComplexityRegistry, ComplexityTier};
pub use constitution::{
    ActionCompliance, ConstitutionalRule, ConstitutionalValidator, Constraint, EnforcementMode,
    GraduationCriteria, GraduationVerdict, ProposedAction, RuleCheck, RuleSet, Violation,
};
pub use error::PolicyError;
pub use history::{AgentHistory, InterventionRecord, JsonFileHistory, MemoryHistory, OutcomeStats};
pub use maturity::{MaturityClassifier, MaturityThresholds, GRADUATION_MARGIN};
