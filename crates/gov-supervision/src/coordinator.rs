// coordinator.rs — Supervision Coordinator.
//
// Owns the lifecycle of supervised executions. Every transition is a
// read-modify-write of the stored session under one transition lock, so two
// concurrent terminates on the same session cannot both succeed.
//
// Each live session has a CancellationToken. The engine binds the spawned
// execution to it; terminating the session cancels the execution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use gov_policy::{AgentHistory, InterventionRecord, MaturityLevel};
use gov_store::RecordStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SupervisionError;
use crate::session::{Correction, Intervention, SessionState, SupervisionSession};

pub struct SupervisionCoordinator {
    store: Arc<dyn RecordStore<SupervisionSession>>,
    history: Arc<dyn AgentHistory>,
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
    transition_lock: Mutex<()>,
}

impl SupervisionCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore<SupervisionSession>>,
        history: Arc<dyn AgentHistory>,
    ) -> Self {
        Self {
            store,
            history,
            tokens: Mutex::new(HashMap::new()),
            transition_lock: Mutex::new(()),
        }
    }

    /// Start an active session and hand back the token its execution must honor.
    pub fn start(
        &self,
        agent_id: &str,
        trigger_id: Uuid,
        action_type: &str,
        maturity: MaturityLevel,
        timeout: Duration,
    ) -> Result<(SupervisionSession, CancellationToken), SupervisionError> {
        let session = SupervisionSession::new(agent_id, trigger_id, action_type, maturity, timeout);
        self.store.save(&session)?;

        let token = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.session_id, token.clone());

        tracing::info!(
            session_id = %session.session_id,
            agent_id,
            action_type,
            "supervision session started"
        );
        Ok((session, token))
    }

    pub fn get(&self, session_id: Uuid) -> Result<SupervisionSession, SupervisionError> {
        self.store
            .get(&session_id.to_string())?
            .ok_or(SupervisionError::NotFound(session_id))
    }

    /// Token of a live session, if the coordinator still tracks one.
    pub fn token(&self, session_id: Uuid) -> Option<CancellationToken> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&session_id)
            .cloned()
    }

    /// Apply `change` to the stored session under the transition lock.
    /// Nothing is saved if `change` fails.
    fn update<F>(&self, session_id: Uuid, change: F) -> Result<SupervisionSession, SupervisionError>
    where
        F: FnOnce(&mut SupervisionSession) -> Result<(), SupervisionError>,
    {
        let _guard = self.transition_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut session = self.get(session_id)?;
        change(&mut session)?;
        self.store.save(&session)?;
        Ok(session)
    }

    pub fn pause(&self, session_id: Uuid) -> Result<SupervisionSession, SupervisionError> {
        let session = self.update(session_id, |s| s.transition(SessionState::Paused))?;
        tracing::info!(%session_id, "supervision session paused");
        Ok(session)
    }

    /// Record a human correction: Active/Paused → Corrected.
    ///
    /// The intervention is written to the agent's history before the
    /// session is saved, so graduation checks see it no later than the
    /// session does.
    pub fn intervene(
        &self,
        session_id: Uuid,
        correction: Correction,
    ) -> Result<SupervisionSession, SupervisionError> {
        let history = self.history.clone();
        let session = self.update(session_id, move |s| {
            s.transition(SessionState::Corrected)?;
            let now = Utc::now();
            let intervention = Intervention {
                intervention_id: Uuid::new_v4(),
                by: correction.by,
                description: correction.description,
                at: now,
                resolved_at: None,
            };
            history.record_intervention(InterventionRecord {
                intervention_id: intervention.intervention_id,
                agent_id: s.agent_id.clone(),
                session_id: s.session_id,
                maturity_at_intervention: s.maturity,
                description: intervention.description.clone(),
                recorded_at: now,
                resolved_at: None,
            })?;
            s.interventions.push(intervention);
            Ok(())
        })?;
        tracing::info!(
            %session_id,
            agent_id = %session.agent_id,
            interventions = session.interventions.len(),
            "supervision intervention recorded"
        );
        Ok(session)
    }

    /// Paused/Corrected → Active. Resuming from Corrected resolves the open
    /// intervention in the session log and in agent history.
    pub fn resume(&self, session_id: Uuid) -> Result<SupervisionSession, SupervisionError> {
        let history = self.history.clone();
        let session = self.update(session_id, move |s| {
            let was_corrected = s.state == SessionState::Corrected;
            s.transition(SessionState::Active)?;
            if was_corrected {
                let now = Utc::now();
                if let Some(open) = s.interventions.iter_mut().find(|i| i.resolved_at.is_none()) {
                    history.resolve_intervention(open.intervention_id, now)?;
                    open.resolved_at = Some(now);
                }
            }
            Ok(())
        })?;
        tracing::info!(%session_id, "supervision session resumed");
        Ok(session)
    }

    /// Any live state → Terminated. Cancels the bound execution.
    pub fn terminate(
        &self,
        session_id: Uuid,
        by: &str,
        reason: &str,
    ) -> Result<SupervisionSession, SupervisionError> {
        let session = self.update(session_id, |s| {
            s.transition(SessionState::Terminated)?;
            s.ended_by = Some(by.to_string());
            s.end_reason = Some(reason.to_string());
            Ok(())
        })?;
        if let Some(token) = self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id)
        {
            token.cancel();
        }
        tracing::warn!(%session_id, by, reason, "supervision session terminated");
        Ok(session)
    }

    /// Active → Completed, called when the supervised execution finishes.
    pub fn complete(&self, session_id: Uuid) -> Result<SupervisionSession, SupervisionError> {
        let session = self.update(session_id, |s| {
            s.transition(SessionState::Completed)?;
            s.ended_by = Some("system".to_string());
            Ok(())
        })?;
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);
        tracing::info!(%session_id, "supervision session completed");
        Ok(session)
    }

    /// Non-terminal sessions, optionally for one agent.
    pub fn live_sessions(
        &self,
        agent_id: Option<&str>,
    ) -> Result<Vec<SupervisionSession>, SupervisionError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|s| !s.state.is_terminal() && agent_id.map_or(true, |a| s.agent_id == a))
            .collect())
    }

    pub fn list(&self) -> Result<Vec<SupervisionSession>, SupervisionError> {
        Ok(self.store.list()?)
    }

    /// Terminate every live session past its expiry.
    pub fn expire_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SupervisionSession>, SupervisionError> {
        let mut expired = Vec::new();
        for session in self.live_sessions(None)? {
            if !session.is_past_expiry(now) {
                continue;
            }
            match self.terminate(session.session_id, "system", "supervision window expired") {
                Ok(s) => expired.push(s),
                // Raced with a human transition; the next sweep re-checks.
                Err(SupervisionError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }
}
