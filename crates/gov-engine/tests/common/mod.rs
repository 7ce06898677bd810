// common/mod.rs — Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gov_audit::MemoryAuditSink;
use gov_engine::{ActionRequest, EngineConfig, Executor, GovernanceEngine};
use gov_policy::{Agent, MemoryHistory, RuleSet};
use gov_proposal::Proposal;
use gov_recovery::{AttemptContext, ExecutionError};
use gov_store::MemoryStore;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Configuration with retry delays removed so failure paths run fast.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.audit.retry_delay_ms = 0;
    config.recovery.base_delay_ms = 0;
    config.recovery.max_delay_ms = 0;
    config
}

pub struct Harness {
    pub engine: GovernanceEngine,
    pub audit: Arc<MemoryAuditSink>,
    pub proposals: Arc<MemoryStore<Proposal>>,
    pub history: Arc<MemoryHistory>,
    pub executor: Arc<RecordingExecutor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(fast_config(), RuleSet::default(), RecordingExecutor::default())
    }

    pub fn with(config: EngineConfig, rules: RuleSet, executor: RecordingExecutor) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let proposals = Arc::new(MemoryStore::new());
        let history = Arc::new(MemoryHistory::new());
        let executor = Arc::new(executor);
        let engine = GovernanceEngine::builder()
            .config(config)
            .rules(rules)
            .audit_sink(audit.clone())
            .proposal_store(proposals.clone())
            .history(history.clone())
            .executor(executor.clone())
            .build()
            .unwrap();
        Self {
            engine,
            audit,
            proposals,
            history,
            executor,
        }
    }

    pub fn agent(&self, id: &str, confidence: f64) -> Agent {
        let agent = Agent::new(id, id, "ws").with_confidence(confidence);
        self.engine.register_agent(agent.clone()).unwrap();
        agent
    }

    pub fn agent_with(&self, agent: Agent) -> Agent {
        self.engine.register_agent(agent.clone()).unwrap();
        agent
    }
}

/// How a RecordingExecutor behaves on each attempt.
#[derive(Default)]
pub enum Behavior {
    #[default]
    Succeed,
    /// Fail with a network error this many times, then succeed.
    FlakyThenSucceed(u32),
    AlwaysNetworkError,
    Reject,
    /// Block until `release` is notified, then succeed.
    Gated,
}

/// Executor that records every request and behaves as configured.
#[derive(Default)]
pub struct RecordingExecutor {
    pub behavior: Behavior,
    pub calls: Mutex<Vec<ActionRequest>>,
    pub attempts: AtomicU32,
    pub release: Notify,
    pub started: Notify,
}

impl RecordingExecutor {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ActionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn run(&self, action: &ActionRequest, ctx: AttemptContext) -> Result<Value, ExecutionError> {
        self.calls.lock().unwrap().push(action.clone());
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            Behavior::Succeed => Ok(json!({ "ok": true, "attempt": ctx.attempt })),
            Behavior::FlakyThenSucceed(failures) if n <= *failures => {
                Err(ExecutionError::Network("connection reset".to_string()))
            }
            Behavior::FlakyThenSucceed(_) => Ok(json!({ "ok": true, "attempt": ctx.attempt })),
            Behavior::AlwaysNetworkError => {
                Err(ExecutionError::Network("connection reset".to_string()))
            }
            Behavior::Reject => Err(ExecutionError::Rejected("not allowed here".to_string())),
            Behavior::Gated => {
                self.started.notify_one();
                self.release.notified().await;
                Ok(json!({ "ok": true }))
            }
        }
    }
}
