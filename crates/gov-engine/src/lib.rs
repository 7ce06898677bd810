//! # gov-engine
//!
//! Routes every attempted agent action through governance before it runs.
//!
//! [`GovernanceEngine::submit_trigger`] resolves which agent a trigger acts
//! as, classifies the agent's maturity and the action's complexity, and
//! routes the pair through a fixed decision table. Actions that would run
//! immediately must also pass the constitutional rules. Depending on the
//! decision the engine files a training or action proposal, opens a
//! supervision session, or hands the action to the embedding application's
//! [`Executor`] under the recovery manager's retry policy.
//!
//! Every decision and every human resolution is written to the audit trail
//! before it takes effect.
//!
//! [`Sweeper`] expires stale proposals and sessions in the background, and
//! [`ConfigWatcher`] hot-reloads `.gov/governance.toml` and
//! `.gov/constitution.yaml`.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod router;
pub mod sweeper;
pub mod trigger;
pub mod watcher;

pub use config::{
    ActiveConfig, AgentDefaults, CacheConfig, ConfigHandle, EngineConfig, GovPaths,
    ProposalConfig, SupervisionConfig,
};
pub use context::{
    system_default_agent_id, AgentContextResolver, AgentSource, ResolvedAgent, SessionBinding,
};
pub use engine::{
    ApprovalOutcome, EngineBuilder, GovernanceEngine, Operation, SubmitOutcome, SweepReport,
};
pub use error::EngineError;
pub use executor::{ActionRequest, Executor, LoggingExecutor};
pub use router::{decide, route, Routed};
pub use sweeper::Sweeper;
pub use trigger::{DecisionStep, RoutingDecision, Trigger, TriggerDecision, TriggerOrigin};
pub use watcher::ConfigWatcher;
