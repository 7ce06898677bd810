// engine.rs — GovernanceEngine, the inbound surface.
//
// Routing a trigger:
//
//   validate → resolve agent → classify (maturity, complexity)
//     → route (table + constitutional gate) → side effect
//     → audit → store decision → dispatch
//
// The audit write comes before the decision is stored so that a stored
// decision always names its audit record. If the audit write fails the
// decision is still stored, without an audit id, nothing is dispatched, and
// the caller gets AuditWriteFailed. Re-submitting the trigger retries the
// audit write and then dispatches.
//
// Confidence writes (outcome recording, graduation) run under a per-agent
// lock and invalidate the maturity cache before the lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use gov_audit::{
    hasher, AuditAction, AuditReceipt, AuditRecord, AuditRetryPolicy, AuditSink, AuditTrail,
    JsonlAuditSink, MemoryAuditSink, RequestContext,
};
use gov_policy::{
    Agent, AgentHistory, JsonFileHistory, MaturityClassifier, MaturityLevel, MemoryHistory,
    PolicyError, ProposedAction, RuleSet,
};
use gov_proposal::{Proposal, ProposalEvaluator, ProposalKind, ProposalStatus};
use gov_recovery::{
    CheckpointStore, ExecutionHandle, ExecutionReport, InFlightExecution, JsonlCheckpointStore,
    MemoryCheckpointStore, RecoveryError, RecoveryManager,
};
use gov_store::{JsonDirStore, MemoryStore, RecordStore};
use gov_supervision::{
    Correction, SessionState, SupervisionCoordinator, SupervisionError, SupervisionSession,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ActiveConfig, ConfigHandle, EngineConfig, GovPaths};
use crate::context::{AgentContextResolver, SessionBinding};
use crate::error::EngineError;
use crate::executor::{ActionRequest, Executor, LoggingExecutor};
use crate::router;
use crate::trigger::{DecisionStep, RoutingDecision, Trigger, TriggerDecision};

/// Confidence change after a successful execution.
const SUCCESS_DELTA: f64 = 0.01;
/// Confidence change after a failed execution.
const FAILURE_DELTA: f64 = -0.02;

/// Result of `submit_trigger`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub decision: TriggerDecision,
    /// Inline execution report for EXECUTE and MANUAL_WARN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    /// True when the trigger had been decided before and nothing was re-routed.
    pub replayed: bool,
}

/// Result of `approve_proposal`.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub proposal: Proposal,
    /// Present when an action proposal was approved and executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
}

/// Something an agent has in progress.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    Execution(InFlightExecution),
    Proposal(Proposal),
    Session(SupervisionSession),
}

/// What one sweep expired.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub expired_proposals: Vec<Proposal>,
    pub expired_sessions: Vec<SupervisionSession>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_proposals.is_empty() && self.expired_sessions.is_empty()
    }
}

/// Collaborators and configuration for a GovernanceEngine.
/// Anything not supplied defaults to an in-memory implementation.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    rules: RuleSet,
    agents: Option<Arc<dyn RecordStore<Agent>>>,
    proposals: Option<Arc<dyn RecordStore<Proposal>>>,
    sessions: Option<Arc<dyn RecordStore<SupervisionSession>>>,
    decisions: Option<Arc<dyn RecordStore<TriggerDecision>>>,
    bindings: Option<Arc<dyn RecordStore<SessionBinding>>>,
    history: Option<Arc<dyn AgentHistory>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    executor: Option<Arc<dyn Executor>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// File-backed collaborators under a project's `.gov/` directory.
    pub fn for_project(paths: &GovPaths) -> Result<Self, EngineError> {
        let config = EngineConfig::load_or_default(&paths.config)?;
        let rules = RuleSet::load_or_default(&paths.constitution)?;
        let sink = JsonlAuditSink::open(&paths.audit_log).map_err(|e| {
            EngineError::Config(format!(
                "cannot open audit log {}: {}",
                paths.audit_log.display(),
                e
            ))
        })?;
        Ok(Self::new()
            .config(config)
            .rules(rules)
            .agent_store(Arc::new(JsonDirStore::<Agent>::new(&paths.agents_dir)?))
            .proposal_store(Arc::new(JsonDirStore::<Proposal>::new(&paths.proposals_dir)?))
            .session_store(Arc::new(JsonDirStore::<SupervisionSession>::new(
                &paths.sessions_dir,
            )?))
            .decision_store(Arc::new(JsonDirStore::<TriggerDecision>::new(
                &paths.decisions_dir,
            )?))
            .binding_store(Arc::new(JsonDirStore::<SessionBinding>::new(
                &paths.bindings_dir,
            )?))
            .history(Arc::new(JsonFileHistory::new(&paths.history)))
            .checkpoints(Arc::new(JsonlCheckpointStore::new(&paths.checkpoints_dir)))
            .audit_sink(Arc::new(sink)))
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn agent_store(mut self, store: Arc<dyn RecordStore<Agent>>) -> Self {
        self.agents = Some(store);
        self
    }

    pub fn proposal_store(mut self, store: Arc<dyn RecordStore<Proposal>>) -> Self {
        self.proposals = Some(store);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn RecordStore<SupervisionSession>>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn decision_store(mut self, store: Arc<dyn RecordStore<TriggerDecision>>) -> Self {
        self.decisions = Some(store);
        self
    }

    pub fn binding_store(mut self, store: Arc<dyn RecordStore<SessionBinding>>) -> Self {
        self.bindings = Some(store);
        self
    }

    pub fn history(mut self, history: Arc<dyn AgentHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<GovernanceEngine, EngineError> {
        let config = ConfigHandle::new(self.config, self.rules)?;

        let agents: Arc<dyn RecordStore<Agent>> = match self.agents {
            Some(s) => s,
            None => Arc::new(MemoryStore::<Agent>::new()),
        };
        let proposals: Arc<dyn RecordStore<Proposal>> = match self.proposals {
            Some(s) => s,
            None => Arc::new(MemoryStore::<Proposal>::new()),
        };
        let sessions: Arc<dyn RecordStore<SupervisionSession>> = match self.sessions {
            Some(s) => s,
            None => Arc::new(MemoryStore::<SupervisionSession>::new()),
        };
        let decisions: Arc<dyn RecordStore<TriggerDecision>> = match self.decisions {
            Some(s) => s,
            None => Arc::new(MemoryStore::<TriggerDecision>::new()),
        };
        let bindings: Arc<dyn RecordStore<SessionBinding>> = match self.bindings {
            Some(s) => s,
            None => Arc::new(MemoryStore::<SessionBinding>::new()),
        };
        let history: Arc<dyn AgentHistory> = match self.history {
            Some(h) => h,
            None => Arc::new(MemoryHistory::new()),
        };
        let checkpoints: Arc<dyn CheckpointStore> = match self.checkpoints {
            Some(c) => c,
            None => Arc::new(MemoryCheckpointStore::new()),
        };
        let sink: Arc<dyn AuditSink> = match self.audit_sink {
            Some(s) => s,
            None => Arc::new(MemoryAuditSink::new()),
        };
        let executor: Arc<dyn Executor> = match self.executor {
            Some(e) => e,
            None => Arc::new(LoggingExecutor),
        };

        Ok(GovernanceEngine {
            inner: Arc::new(EngineInner {
                config,
                resolver: AgentContextResolver::new(agents.clone(), bindings),
                supervision: SupervisionCoordinator::new(sessions, history.clone()),
                recovery: RecoveryManager::new(checkpoints),
                audit: AuditTrail::new(sink),
                classifier: MaturityClassifier::new(),
                agents,
                proposals,
                decisions,
                history,
                executor,
                in_flight: Mutex::new(HashSet::new()),
                agent_locks: Mutex::new(HashMap::new()),
                proposal_lock: tokio::sync::Mutex::new(()),
                supervised_tasks: Mutex::new(HashMap::new()),
                completion_pending: Mutex::new(HashSet::new()),
            }),
        })
    }
}

struct EngineInner {
    config: ConfigHandle,
    agents: Arc<dyn RecordStore<Agent>>,
    proposals: Arc<dyn RecordStore<Proposal>>,
    decisions: Arc<dyn RecordStore<TriggerDecision>>,
    history: Arc<dyn AgentHistory>,
    resolver: AgentContextResolver,
    classifier: MaturityClassifier,
    supervision: SupervisionCoordinator,
    recovery: RecoveryManager,
    executor: Arc<dyn Executor>,
    audit: AuditTrail,
    /// Triggers currently being routed.
    in_flight: Mutex<HashSet<Uuid>>,
    agent_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serializes proposal resolution against the expiry sweep.
    proposal_lock: tokio::sync::Mutex<()>,
    supervised_tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    /// Sessions whose execution finished while paused or corrected.
    completion_pending: Mutex<HashSet<Uuid>>,
}

/// Removes a trigger from the in-flight set when routing ends.
struct TriggerClaim<'a> {
    in_flight: &'a Mutex<HashSet<Uuid>>,
    trigger_id: Uuid,
}

impl Drop for TriggerClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.trigger_id);
    }
}

/// The governance engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct GovernanceEngine {
    inner: Arc<EngineInner>,
}

impl GovernanceEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    // ── Routing ──────────────────────────────────────────────────

    /// Route one trigger and apply the side effects of its decision.
    ///
    /// A blocked or deferred action is a normal outcome, not an error.
    pub async fn submit_trigger(&self, trigger: Trigger) -> Result<SubmitOutcome, EngineError> {
        trigger.validate()?;
        let _claim = self.claim(trigger.trigger_id)?;
        let active = self.inner.config.snapshot();

        if let Some(existing) = self.inner.decisions.get(&trigger.trigger_id.to_string())? {
            return self.replay(existing, &trigger, &active).await;
        }

        let cfg = &active.config;
        let resolved = self.inner.resolver.resolve(
            trigger.agent_id.as_deref(),
            trigger.session_id.as_deref(),
            &trigger.workspace_id,
            cfg.agents.default_confidence,
        )?;
        let agent = resolved.agent;
        let maturity = self.classify(&active, &agent);
        let complexity = active.registry.classify(&trigger.action_type);

        let action = ProposedAction {
            agent_id: agent.agent_id.clone(),
            action_type: trigger.action_type.clone(),
            complexity,
            maturity,
            confidence: agent.confidence,
            payload: trigger.payload.clone(),
        };
        let routed = router::route(&action, trigger.origin, &active.validator);

        let mut trace = vec![
            DecisionStep::new(
                "agent_resolution",
                format!("{} ({})", agent.agent_id, resolved.source),
            ),
            DecisionStep::new(
                "maturity",
                match agent.confidence {
                    Some(c) => format!("{} (confidence {:.2})", maturity, c),
                    None => format!("{} (unscored)", maturity),
                },
            ),
            DecisionStep::new(
                "complexity",
                format!("{} -> {}", trigger.action_type, complexity),
            ),
        ];
        trace.extend(routed.steps);

        let mut decision = TriggerDecision {
            trigger_id: trigger.trigger_id,
            agent_id: agent.agent_id.clone(),
            action_type: trigger.action_type.clone(),
            origin: trigger.origin,
            maturity,
            complexity,
            decision: routed.decision,
            proposal_id: None,
            session_id: None,
            violation: routed.violation,
            warnings: routed.warnings,
            trace,
            audit_event_id: None,
            decided_at: Utc::now(),
        };

        let mut supervision_token = None;
        match decision.decision {
            RoutingDecision::BlockToTraining => {
                let target = maturity.next().unwrap_or(MaturityLevel::Intern);
                let proposal = Proposal::training(
                    &agent.agent_id,
                    target,
                    format!(
                        "{} must reach {} before running '{}' unattended",
                        agent.agent_id, target, trigger.action_type
                    ),
                    cfg.proposal_expiry(),
                )
                .with_trigger(trigger.trigger_id)
                .with_blocked_action(&trigger.action_type)
                .with_confidence(agent.confidence);
                decision.proposal_id = Some(self.file_proposal(proposal, maturity, &active)?);
            }
            RoutingDecision::CreateProposal => {
                let mut proposal = Proposal::action(
                    &agent.agent_id,
                    &trigger.action_type,
                    trigger.payload.clone(),
                    cfg.proposal_expiry(),
                )
                .with_trigger(trigger.trigger_id)
                .with_confidence(agent.confidence);
                if let Some(v) = &decision.violation {
                    proposal = proposal.with_description(format!(
                        "Approve action '{}' held by rule {}: {}",
                        trigger.action_type, v.rule_id, v.reason
                    ));
                }
                decision.proposal_id = Some(self.file_proposal(proposal, maturity, &active)?);
            }
            RoutingDecision::Supervise => {
                let (session, token) = self.inner.supervision.start(
                    &agent.agent_id,
                    trigger.trigger_id,
                    &trigger.action_type,
                    maturity,
                    cfg.session_timeout(),
                )?;
                decision.session_id = Some(session.session_id);
                supervision_token = Some(token);
            }
            RoutingDecision::Execute | RoutingDecision::ManualWarn => {}
        }

        let decision = self
            .commit_decision(decision, &trigger, &cfg.audit)
            .await?;
        let execution = self
            .dispatch(&decision, &trigger, supervision_token, &active)
            .await?;
        Ok(SubmitOutcome {
            decision,
            execution,
            replayed: false,
        })
    }

    /// A trigger that already has a decision. An audited decision is
    /// returned untouched. An unaudited one gets its audit write retried
    /// and, once audited, is dispatched.
    async fn replay(
        &self,
        mut decision: TriggerDecision,
        trigger: &Trigger,
        active: &ActiveConfig,
    ) -> Result<SubmitOutcome, EngineError> {
        if decision.is_audited() {
            tracing::debug!(trigger_id = %decision.trigger_id, "trigger already decided, replaying");
            return Ok(SubmitOutcome {
                decision,
                execution: None,
                replayed: true,
            });
        }

        tracing::warn!(trigger_id = %decision.trigger_id, "retrying audit write for unaudited decision");
        let receipt = self
            .inner
            .audit
            .record(decision_audit(&decision, trigger), &active.config.audit)
            .await
            .map_err(|e| EngineError::AuditWriteFailed {
                subject: decision.trigger_id.to_string(),
                reason: e.to_string(),
                decision: Some(Box::new(decision.clone())),
            })?;
        decision.audit_event_id = Some(receipt.record_id);
        self.inner.decisions.save(&decision)?;

        let execution = self.dispatch(&decision, trigger, None, active).await?;
        Ok(SubmitOutcome {
            decision,
            execution,
            replayed: true,
        })
    }

    fn claim(&self, trigger_id: Uuid) -> Result<TriggerClaim<'_>, EngineError> {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(trigger_id) {
            return Err(EngineError::InvalidTrigger {
                reason: format!("trigger {} is already being routed", trigger_id),
            });
        }
        Ok(TriggerClaim {
            in_flight: &self.inner.in_flight,
            trigger_id,
        })
    }

    fn classify(&self, active: &ActiveConfig, agent: &Agent) -> MaturityLevel {
        let agents = self.inner.agents.clone();
        let agent_id = agent.agent_id.clone();
        self.inner.classifier.classify_cached(
            &active.config.maturity,
            active.config.cache_ttl(),
            agent,
            move || agents.get(&agent_id).map_err(PolicyError::from),
        )
    }

    /// Score and persist a new proposal.
    fn file_proposal(
        &self,
        mut proposal: Proposal,
        maturity: MaturityLevel,
        active: &ActiveConfig,
    ) -> Result<Uuid, EngineError> {
        let score = ProposalEvaluator::score(
            &proposal,
            maturity,
            &active.registry,
            self.inner.history.as_ref(),
        )?;
        proposal.risk_score = Some(score);
        self.inner.proposals.save(&proposal)?;
        tracing::info!(
            proposal_id = %proposal.proposal_id,
            agent_id = %proposal.agent_id,
            kind = proposal.kind.label(),
            risk_score = score,
            "proposal created"
        );
        Ok(proposal.proposal_id)
    }

    /// Audit, then store. The decision is stored even if the audit fails.
    async fn commit_decision(
        &self,
        mut decision: TriggerDecision,
        trigger: &Trigger,
        policy: &AuditRetryPolicy,
    ) -> Result<TriggerDecision, EngineError> {
        let audited = self
            .inner
            .audit
            .record(decision_audit(&decision, trigger), policy)
            .await;
        if let Ok(receipt) = &audited {
            decision.audit_event_id = Some(receipt.record_id);
        }
        self.inner.decisions.save(&decision)?;

        if decision.decision == RoutingDecision::ManualWarn {
            tracing::warn!(
                trigger_id = %decision.trigger_id,
                agent_id = %decision.agent_id,
                action_type = %decision.action_type,
                maturity = %decision.maturity,
                "manual trigger executes past the agent's tier"
            );
        } else {
            tracing::info!(
                trigger_id = %decision.trigger_id,
                agent_id = %decision.agent_id,
                action_type = %decision.action_type,
                maturity = %decision.maturity,
                complexity = %decision.complexity,
                decision = %decision.decision,
                "trigger routed"
            );
        }

        match audited {
            Ok(_) => Ok(decision),
            Err(e) => Err(EngineError::AuditWriteFailed {
                subject: decision.trigger_id.to_string(),
                reason: e.to_string(),
                decision: Some(Box::new(decision)),
            }),
        }
    }

    async fn dispatch(
        &self,
        decision: &TriggerDecision,
        trigger: &Trigger,
        token: Option<CancellationToken>,
        active: &ActiveConfig,
    ) -> Result<Option<ExecutionReport>, EngineError> {
        let request = ActionRequest {
            agent_id: decision.agent_id.clone(),
            action_type: decision.action_type.clone(),
            payload: trigger.payload.clone(),
            trigger_id: Some(decision.trigger_id),
            proposal_id: None,
            session_id: decision.session_id,
            warning: decision.decision == RoutingDecision::ManualWarn,
        };
        match decision.decision {
            RoutingDecision::Execute | RoutingDecision::ManualWarn => {
                let report = self
                    .execute(request, &active.config, &CancellationToken::new())
                    .await?;
                Ok(Some(report))
            }
            RoutingDecision::Supervise => {
                let Some(session_id) = decision.session_id else {
                    return Ok(None);
                };
                match token.or_else(|| self.inner.supervision.token(session_id)) {
                    Some(token) => {
                        self.spawn_supervised(request, session_id, token, active.config.clone())
                    }
                    None => tracing::warn!(
                        %session_id,
                        "supervision session is not live in this process, execution not started"
                    ),
                }
                Ok(None)
            }
            RoutingDecision::BlockToTraining | RoutingDecision::CreateProposal => Ok(None),
        }
    }

    // ── Execution ────────────────────────────────────────────────

    /// Run an action through the recovery manager and record its outcome.
    async fn execute(
        &self,
        request: ActionRequest,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, EngineError> {
        let mut handle = ExecutionHandle::new(&request.agent_id, &request.action_type);
        if let Some(trigger_id) = request.trigger_id {
            handle = handle.with_trigger(trigger_id);
        }

        let executor = self.inner.executor.clone();
        let req = &request;
        let result = self
            .inner
            .recovery
            .retry(&handle, &config.recovery, cancel, |ctx| {
                let executor = executor.clone();
                async move { executor.run(req, ctx).await }
            })
            .await;

        match &result {
            Ok(_) => self.record_outcome(&request.agent_id, &request.action_type, true),
            Err(RecoveryError::Cancelled { .. }) => {}
            Err(_) => self.record_outcome(&request.agent_id, &request.action_type, false),
        }

        let (outcome, detail) = match &result {
            Ok(report) => ("succeeded", json!({ "attempts": report.attempts })),
            Err(RecoveryError::RetriesExhausted {
                attempts,
                last_error,
                ..
            }) => (
                "retries_exhausted",
                json!({ "attempts": attempts, "error": last_error.to_string() }),
            ),
            Err(RecoveryError::Cancelled { attempts, .. }) => {
                ("cancelled", json!({ "attempts": attempts }))
            }
            Err(e) => ("failed", json!({ "error": e.to_string() })),
        };
        let record = AuditRecord::new(&request.agent_id, AuditAction::ExecutionOutcome)
            .with_subject(handle.execution_id.to_string())
            .with_outcome(outcome)
            .with_metadata(json!({
                "action_type": request.action_type,
                "trigger_id": request.trigger_id,
                "proposal_id": request.proposal_id,
                "session_id": request.session_id,
                "detail": detail,
            }));
        // AuditTrail logs an exhausted write at error level; the outcome stands.
        let _ = self.inner.audit.record(record, &config.audit).await;

        result.map_err(EngineError::from)
    }

    /// History entry plus a confidence nudge for the agent.
    fn record_outcome(&self, agent_id: &str, action_type: &str, success: bool) {
        if let Err(e) = self
            .inner
            .history
            .record_outcome(agent_id, action_type, success, Utc::now())
        {
            tracing::warn!(agent_id, action_type, error = %e, "failed to record execution outcome");
        }

        let lock = self.agent_lock(agent_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.inner.agents.get(agent_id) {
            Ok(Some(mut agent)) => {
                agent.adjust_confidence(if success { SUCCESS_DELTA } else { FAILURE_DELTA });
                if let Err(e) = self.inner.agents.save(&agent) {
                    tracing::warn!(agent_id, error = %e, "failed to persist confidence update");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(agent_id, error = %e, "failed to load agent for confidence update"),
        }
        self.inner.classifier.invalidate(agent_id);
    }

    fn agent_lock(&self, agent_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .agent_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(agent_id.to_string())
            .or_default()
            .clone()
    }

    fn spawn_supervised(
        &self,
        request: ActionRequest,
        session_id: Uuid,
        token: CancellationToken,
        config: EngineConfig,
    ) {
        let engine = self.clone();
        // The task removes its own entry when it finishes, so it must be
        // inserted before the task can reach that point.
        let mut tasks = self
            .inner
            .supervised_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let handle = tokio::spawn(async move {
            let result = engine.execute(request, &config, &token).await;
            engine.finish_supervised(session_id, result, &config.audit).await;
        });
        tasks.insert(session_id, handle);
    }

    /// Sessions with a supervised execution still tracked in this process.
    pub fn running_supervised(&self) -> Vec<Uuid> {
        self.inner
            .supervised_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    async fn finish_supervised(
        &self,
        session_id: Uuid,
        result: Result<ExecutionReport, EngineError>,
        audit: &AuditRetryPolicy,
    ) {
        match result {
            Ok(_) => self.complete_supervised(session_id, audit).await,
            Err(EngineError::Cancelled { .. }) => {
                tracing::info!(%session_id, "supervised execution cancelled");
            }
            Err(e) => {
                let reason = format!("execution failed: {}", e);
                match self.inner.supervision.terminate(session_id, "system", &reason) {
                    Ok(session) => {
                        let record = session_audit(
                            &session,
                            AuditAction::SupervisionTerminated,
                            "system",
                            "active",
                            "execution_failed",
                        )
                        .with_metadata(json!({ "reason": reason }));
                        let _ = self.inner.audit.record(record, audit).await;
                    }
                    Err(err) => {
                        tracing::warn!(%session_id, error = %err, "could not terminate session after failed execution")
                    }
                }
            }
        }
        self.inner
            .supervised_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
    }

    async fn complete_supervised(&self, session_id: Uuid, audit: &AuditRetryPolicy) {
        match self.inner.supervision.complete(session_id) {
            Ok(session) => {
                let record = session_audit(
                    &session,
                    AuditAction::SupervisionCompleted,
                    "system",
                    "active",
                    "completed",
                );
                let _ = self.inner.audit.record(record, audit).await;
            }
            Err(SupervisionError::InvalidTransition { from, .. }) => {
                if from == SessionState::Paused.to_string()
                    || from == SessionState::Corrected.to_string()
                {
                    tracing::info!(%session_id, state = %from, "supervised execution finished; session completes on resume");
                    self.inner
                        .completion_pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(session_id);
                } else {
                    tracing::debug!(%session_id, state = %from, "supervised execution finished after session ended");
                }
            }
            Err(e) => tracing::warn!(%session_id, error = %e, "failed to complete supervision session"),
        }
    }

    /// Wait for the supervised execution bound to a session, if one is
    /// still running in this process.
    pub async fn wait_supervised(&self, session_id: Uuid) {
        let handle = self
            .inner
            .supervised_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(%session_id, error = %e, "supervised execution task failed");
            }
        }
    }

    // ── Proposals ────────────────────────────────────────────────

    /// Approve a pending proposal. An approved action proposal is executed.
    pub async fn approve_proposal(
        &self,
        proposal_id: Uuid,
        approver: &str,
    ) -> Result<ApprovalOutcome, EngineError> {
        let active = self.inner.config.snapshot();
        let proposal = {
            let _lock = self.inner.proposal_lock.lock().await;
            let mut proposal = self.load_proposal(proposal_id)?;
            if !proposal.is_pending() {
                // Reports the illegal transition.
                proposal.approve(approver)?;
            }
            if proposal.is_past_expiry(Utc::now()) {
                return Err(EngineError::NotApprovable {
                    proposal_id,
                    reasons: vec![format!(
                        "approval window closed at {}",
                        proposal.expires_at.to_rfc3339()
                    )],
                });
            }

            let agent = self
                .inner
                .agents
                .get(&proposal.agent_id)?
                .ok_or_else(|| EngineError::AgentNotFound(proposal.agent_id.clone()))?;
            let maturity = self.classify(&active, &agent);
            let check = ProposalEvaluator::new(active.config.proposals.risk_ceiling)
                .check_approval_criteria(&proposal, &agent, maturity, &active.registry);
            let mut reasons = check.reasons;

            // Approval never overrides the constitution.
            if let ProposalKind::Action {
                action_type,
                payload,
            } = &proposal.kind
            {
                let compliance = active.validator.validate_action(&ProposedAction {
                    agent_id: agent.agent_id.clone(),
                    action_type: action_type.clone(),
                    complexity: active.registry.classify(action_type),
                    maturity,
                    confidence: agent.confidence,
                    payload: payload.clone(),
                });
                if !compliance.compliant {
                    reasons.push(match compliance.violation {
                        Some(v) => format!("constitutional rule {} violated: {}", v.rule_id, v.reason),
                        None => "action is not constitutionally compliant".to_string(),
                    });
                }
            }
            if !check.approvable || !reasons.is_empty() {
                tracing::warn!(%proposal_id, approver, ?reasons, "approval refused");
                return Err(EngineError::NotApprovable {
                    proposal_id,
                    reasons,
                });
            }

            proposal.approve(approver)?;
            self.inner.proposals.save(&proposal)?;
            tracing::info!(%proposal_id, approver, kind = proposal.kind.label(), "proposal approved");

            let record = AuditRecord::new(approver, AuditAction::ProposalApproved)
                .with_subject(proposal_id.to_string())
                .with_transition("pending", "approved")
                .with_outcome("approved")
                .with_metadata(json!({
                    "agent_id": proposal.agent_id,
                    "kind": proposal.kind.label(),
                    "risk_score": proposal.risk_score,
                }));
            self.write_audit(record, &active.config.audit).await?;
            proposal
        };

        let execution = match &proposal.kind {
            ProposalKind::Action {
                action_type,
                payload,
            } => {
                let mut request = ActionRequest::new(&proposal.agent_id, action_type, payload.clone());
                request.trigger_id = proposal.trigger_id;
                request.proposal_id = Some(proposal.proposal_id);
                Some(
                    self.execute(request, &active.config, &CancellationToken::new())
                        .await?,
                )
            }
            ProposalKind::Training { .. } => None,
        };
        Ok(ApprovalOutcome {
            proposal,
            execution,
        })
    }

    pub async fn reject_proposal(
        &self,
        proposal_id: Uuid,
        approver: &str,
        reason: &str,
    ) -> Result<Proposal, EngineError> {
        let active = self.inner.config.snapshot();
        let _lock = self.inner.proposal_lock.lock().await;
        let mut proposal = self.load_proposal(proposal_id)?;
        proposal.reject(approver, reason)?;
        self.inner.proposals.save(&proposal)?;
        tracing::info!(%proposal_id, approver, reason, "proposal rejected");

        let record = AuditRecord::new(approver, AuditAction::ProposalRejected)
            .with_subject(proposal_id.to_string())
            .with_transition("pending", "rejected")
            .with_outcome("rejected")
            .with_metadata(json!({ "agent_id": proposal.agent_id, "reason": reason }));
        self.write_audit(record, &active.config.audit).await?;
        Ok(proposal)
    }

    fn load_proposal(&self, proposal_id: Uuid) -> Result<Proposal, EngineError> {
        self.inner
            .proposals
            .get(&proposal_id.to_string())?
            .ok_or(EngineError::ProposalNotFound(proposal_id))
    }

    pub fn proposal(&self, proposal_id: Uuid) -> Result<Proposal, EngineError> {
        self.load_proposal(proposal_id)
    }

    /// Proposals in review order, optionally filtered by status.
    pub fn proposals(&self, status: Option<ProposalStatus>) -> Result<Vec<Proposal>, EngineError> {
        let mut list: Vec<Proposal> = self
            .inner
            .proposals
            .list()?
            .into_iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .collect();
        ProposalEvaluator::rank(&mut list);
        Ok(list)
    }

    // ── Supervision ──────────────────────────────────────────────

    pub async fn pause_session(
        &self,
        session_id: Uuid,
        by: &str,
    ) -> Result<SupervisionSession, EngineError> {
        let active = self.inner.config.snapshot();
        let before = self.inner.supervision.get(session_id)?.state;
        let session = self.inner.supervision.pause(session_id)?;
        let record = session_audit(
            &session,
            AuditAction::SupervisionPaused,
            by,
            &before.to_string(),
            "paused",
        );
        self.write_audit(record, &active.config.audit).await?;
        Ok(session)
    }

    /// Record a human correction on a live session.
    pub async fn intervene(
        &self,
        session_id: Uuid,
        correction: Correction,
    ) -> Result<SupervisionSession, EngineError> {
        let active = self.inner.config.snapshot();
        let before = self.inner.supervision.get(session_id)?.state;
        let by = correction.by.clone();
        let description = correction.description.clone();
        let session = self.inner.supervision.intervene(session_id, correction)?;
        let record = session_audit(
            &session,
            AuditAction::SupervisionIntervention,
            &by,
            &before.to_string(),
            "corrected",
        )
        .with_metadata(json!({ "agent_id": session.agent_id, "description": description }));
        self.write_audit(record, &active.config.audit).await?;
        Ok(session)
    }

    pub async fn resume_session(
        &self,
        session_id: Uuid,
        by: &str,
    ) -> Result<SupervisionSession, EngineError> {
        let active = self.inner.config.snapshot();
        let before = self.inner.supervision.get(session_id)?.state;
        let session = self.inner.supervision.resume(session_id)?;
        let record = session_audit(
            &session,
            AuditAction::SupervisionResumed,
            by,
            &before.to_string(),
            "active",
        );
        self.write_audit(record, &active.config.audit).await?;

        let finished = self
            .inner
            .completion_pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
        if finished {
            self.complete_supervised(session_id, &active.config.audit).await;
            return Ok(self.inner.supervision.get(session_id)?);
        }
        Ok(session)
    }

    /// End a live session and cancel its execution.
    pub async fn terminate_session(
        &self,
        session_id: Uuid,
        by: &str,
        reason: &str,
    ) -> Result<SupervisionSession, EngineError> {
        let active = self.inner.config.snapshot();
        let before = self.inner.supervision.get(session_id)?.state;
        let session = self.inner.supervision.terminate(session_id, by, reason)?;
        self.inner
            .completion_pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
        let record = session_audit(
            &session,
            AuditAction::SupervisionTerminated,
            by,
            &before.to_string(),
            "terminated",
        )
        .with_metadata(json!({ "reason": reason }));
        self.write_audit(record, &active.config.audit).await?;
        Ok(session)
    }

    pub fn session(&self, session_id: Uuid) -> Result<SupervisionSession, EngineError> {
        Ok(self.inner.supervision.get(session_id)?)
    }

    pub fn sessions(&self) -> Result<Vec<SupervisionSession>, EngineError> {
        Ok(self.inner.supervision.list()?)
    }

    // ── Agents ───────────────────────────────────────────────────

    pub fn register_agent(&self, agent: Agent) -> Result<(), EngineError> {
        let lock = self.agent_lock(&agent.agent_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.agents.save(&agent)?;
        self.inner.classifier.invalidate(&agent.agent_id);
        tracing::info!(agent_id = %agent.agent_id, "agent registered");
        Ok(())
    }

    pub fn agent(&self, agent_id: &str) -> Result<Agent, EngineError> {
        self.inner
            .agents
            .get(agent_id)?
            .ok_or_else(|| EngineError::AgentNotFound(agent_id.to_string()))
    }

    pub fn agents(&self) -> Result<Vec<Agent>, EngineError> {
        Ok(self.inner.agents.list()?)
    }

    /// Current tier of an agent, through the cache.
    pub fn maturity_of(&self, agent_id: &str) -> Result<MaturityLevel, EngineError> {
        let agent = self.agent(agent_id)?;
        Ok(self.classify(&self.inner.config.snapshot(), &agent))
    }

    pub fn set_session_agent(&self, session_id: &str, agent_id: &str) -> Result<(), EngineError> {
        self.inner.resolver.set_session_agent(session_id, agent_id)
    }

    /// Move an agent up one tier.
    ///
    /// The agent's confidence is raised a margin above the target tier's
    /// lower bound so the tier stays derivable from the score and a single
    /// failure does not undo the promotion. The cache is invalidated
    /// before the agent lock is released; from then on no classification
    /// returns the old tier.
    pub async fn graduate(
        &self,
        agent_id: &str,
        target: MaturityLevel,
        by: &str,
    ) -> Result<Agent, EngineError> {
        let active = self.inner.config.snapshot();
        let cfg = &active.config;

        let (agent, current) = {
            let lock = self.agent_lock(agent_id);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut agent = self.agent(agent_id)?;
            let current = MaturityClassifier::classify(&cfg.maturity, &agent);
            let verdict = active.validator.check_graduation_eligibility(
                &agent,
                current,
                target,
                self.inner.history.as_ref(),
                &cfg.graduation,
                Utc::now(),
            );
            if !verdict.eligible {
                return Err(EngineError::NotEligible {
                    agent_id: agent_id.to_string(),
                    reasons: verdict.blocking_reasons,
                });
            }

            let seat = cfg.maturity.graduation_seat(target);
            let score = agent.confidence.filter(|c| c.is_finite()).unwrap_or(0.0);
            agent.confidence = Some(score.max(seat));
            agent.updated_at = Utc::now();
            self.inner.agents.save(&agent)?;
            self.inner.classifier.invalidate(agent_id);
            (agent, current)
        };

        tracing::info!(agent_id, from = %current, to = %target, by, "agent graduated");
        let record = AuditRecord::new(by, AuditAction::Graduation)
            .with_subject(agent_id)
            .with_transition(current.as_str(), target.as_str())
            .with_outcome("graduated")
            .with_metadata(json!({ "confidence": agent.confidence }));
        self.write_audit(record, &cfg.audit).await?;
        Ok(agent)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// In-flight executions, pending proposals (review order), and live
    /// supervision sessions for an agent.
    pub fn get_active_operations(&self, agent_id: &str) -> Result<Vec<Operation>, EngineError> {
        let mut ops: Vec<Operation> = self
            .inner
            .recovery
            .in_flight(Some(agent_id))
            .into_iter()
            .map(Operation::Execution)
            .collect();

        let mut pending = gov_proposal::pending(self.inner.proposals.as_ref(), Some(agent_id))?;
        ProposalEvaluator::rank(&mut pending);
        ops.extend(pending.into_iter().map(Operation::Proposal));

        ops.extend(
            self.inner
                .supervision
                .live_sessions(Some(agent_id))?
                .into_iter()
                .map(Operation::Session),
        );
        Ok(ops)
    }

    pub fn decision(&self, trigger_id: Uuid) -> Result<Option<TriggerDecision>, EngineError> {
        Ok(self.inner.decisions.get(&trigger_id.to_string())?)
    }

    /// Latest checkpointed state of an execution.
    pub fn restore_state(&self, execution_id: Uuid) -> Result<Value, EngineError> {
        Ok(self.inner.recovery.restore_state(execution_id)?)
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Expire overdue pending proposals and supervision sessions.
    pub async fn sweep_expired(&self) -> Result<SweepReport, EngineError> {
        let active = self.inner.config.snapshot();
        let now = Utc::now();

        let expired_proposals = {
            let _lock = self.inner.proposal_lock.lock().await;
            gov_proposal::expire_pending(self.inner.proposals.as_ref(), now)?
        };
        for p in &expired_proposals {
            let record = AuditRecord::new("system", AuditAction::ProposalExpired)
                .with_subject(p.proposal_id.to_string())
                .with_transition("pending", "expired")
                .with_outcome("expired")
                .with_metadata(json!({ "agent_id": p.agent_id, "expires_at": p.expires_at }));
            let _ = self.inner.audit.record(record, &active.config.audit).await;
        }

        let expired_sessions = self.inner.supervision.expire_overdue(now)?;
        for s in &expired_sessions {
            self.inner
                .completion_pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&s.session_id);
            let record = session_audit(
                s,
                AuditAction::SupervisionTerminated,
                "system",
                "live",
                "terminated",
            )
            .with_outcome("expired");
            let _ = self.inner.audit.record(record, &active.config.audit).await;
        }

        Ok(SweepReport {
            expired_proposals,
            expired_sessions,
        })
    }

    /// Install a new configuration. In-flight operations keep the snapshot
    /// they started with. A threshold change drops every cached tier.
    pub fn reload_config(&self, config: EngineConfig) -> Result<(), EngineError> {
        let previous = self.inner.config.replace_config(config)?;
        let current = self.inner.config.snapshot();
        if previous.config.maturity != current.config.maturity {
            self.inner.classifier.invalidate_all();
        }
        tracing::info!(
            registry_entries = current.registry.len(),
            risk_ceiling = current.config.proposals.risk_ceiling,
            "configuration reloaded"
        );
        Ok(())
    }

    pub fn reload_rules(&self, rules: RuleSet) {
        let count = rules.rules.len();
        self.inner.config.replace_rules(rules);
        tracing::info!(rules = count, "constitutional rules reloaded");
    }

    pub fn config(&self) -> Arc<ActiveConfig> {
        self.inner.config.snapshot()
    }

    async fn write_audit(
        &self,
        record: AuditRecord,
        policy: &AuditRetryPolicy,
    ) -> Result<AuditReceipt, EngineError> {
        let subject = record.subject.clone().unwrap_or_default();
        self.inner
            .audit
            .record(record, policy)
            .await
            .map_err(|e| EngineError::AuditWriteFailed {
                subject,
                reason: e.to_string(),
                decision: None,
            })
    }
}

/// The single audit record for a routing decision.
fn decision_audit(decision: &TriggerDecision, trigger: &Trigger) -> AuditRecord {
    let (action, outcome) = match decision.decision {
        RoutingDecision::ManualWarn => (AuditAction::ManualOverride, "executed_with_warning"),
        RoutingDecision::Execute => (AuditAction::TriggerDecision, "executed"),
        RoutingDecision::BlockToTraining => (AuditAction::TriggerDecision, "block_to_training"),
        RoutingDecision::CreateProposal => (AuditAction::TriggerDecision, "create_proposal"),
        RoutingDecision::Supervise => (AuditAction::TriggerDecision, "supervise"),
    };
    AuditRecord::new(&decision.agent_id, action)
        .with_subject(decision.trigger_id.to_string())
        .with_transition(decision.maturity.as_str(), decision.decision.to_string())
        .with_outcome(outcome)
        .with_context(Some(trigger.request_context()))
        .with_metadata(json!({
            "action_type": decision.action_type,
            "payload_sha256": hasher::hash_json(&trigger.payload).ok(),
            "origin": decision.origin,
            "complexity": decision.complexity,
            "decision": decision.decision,
            "proposal_id": decision.proposal_id,
            "session_id": decision.session_id,
            "violation": decision.violation,
            "warnings": decision.warnings,
        }))
}

fn session_audit(
    session: &SupervisionSession,
    action: AuditAction,
    actor: &str,
    before: &str,
    after: &str,
) -> AuditRecord {
    AuditRecord::new(actor, action)
        .with_subject(session.session_id.to_string())
        .with_transition(before, after)
        .with_outcome(after)
        .with_context(Some(RequestContext {
            session_id: Some(session.session_id.to_string()),
            ..Default::default()
        }))
        .with_metadata(json!({
            "agent_id": session.agent_id,
            "trigger_id": session.trigger_id,
            "action_type": session.action_type,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_audit::MemoryAuditSink;

    fn engine_with(sink: Arc<MemoryAuditSink>) -> GovernanceEngine {
        GovernanceEngine::builder()
            .audit_sink(sink)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn audit_records_distinguish_manual_override() {
        let sink = Arc::new(MemoryAuditSink::new());
        let engine = engine_with(sink.clone());
        engine
            .register_agent(Agent::new("novice", "Novice", "ws").with_confidence(0.1))
            .unwrap();

        let outcome = engine
            .submit_trigger(Trigger::manual("read_data", "ws").with_agent("novice"))
            .await
            .unwrap();
        assert_eq!(outcome.decision.decision, RoutingDecision::ManualWarn);
        assert!(outcome.execution.is_some());

        let records = sink.records();
        let decision_record = records
            .iter()
            .find(|r| r.action == AuditAction::ManualOverride)
            .unwrap();
        assert_eq!(decision_record.outcome, "executed_with_warning");
        assert_eq!(
            Some(decision_record.record_id),
            outcome.decision.audit_event_id
        );
        assert!(!records.iter().any(|r| r.action == AuditAction::TriggerDecision));
    }

    #[tokio::test]
    async fn concurrent_duplicate_submission_is_rejected() {
        let engine = engine_with(Arc::new(MemoryAuditSink::new()));
        let trigger = Trigger::automated("read_data", "ws");
        let _claim = engine.claim(trigger.trigger_id).unwrap();
        let err = engine.submit_trigger(trigger).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTrigger { .. }));
    }

    #[test]
    fn threshold_reload_invalidates_cached_tiers() {
        let engine = engine_with(Arc::new(MemoryAuditSink::new()));
        engine
            .register_agent(Agent::new("a", "A", "ws").with_confidence(0.65))
            .unwrap();
        assert_eq!(engine.maturity_of("a").unwrap(), MaturityLevel::Intern);

        let mut config = EngineConfig::default();
        config.maturity.supervised = 0.6;
        engine.reload_config(config).unwrap();
        assert_eq!(engine.maturity_of("a").unwrap(), MaturityLevel::Supervised);
    }

    #[test]
    fn rejected_reload_keeps_running_config() {
        let engine = engine_with(Arc::new(MemoryAuditSink::new()));
        let mut bad = EngineConfig::default();
        bad.proposals.risk_ceiling = 2.0;
        assert!(matches!(engine.reload_config(bad), Err(EngineError::Config(_))));
        assert_eq!(engine.config().config.proposals.risk_ceiling, 0.75);
    }
}
