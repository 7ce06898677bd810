// context.rs — Agent Context Resolver.
//
// Decides which agent a request acts as. Resolution order:
//
//   1. the explicit agent id on the request (must exist)
//   2. the agent bound to the caller's session
//   3. the workspace's system-default agent, created on first use
//
// A store failure at any step is reported as ResolutionFailed. The resolver
// never guesses past an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use gov_policy::Agent;
use gov_store::{Record, RecordStore, StoreError};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Session → agent association made by `set_session_agent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionBinding {
    pub session_id: String,
    pub agent_id: String,
    pub bound_at: DateTime<Utc>,
}

impl Record for SessionBinding {
    fn record_id(&self) -> String {
        self.session_id.clone()
    }
}

/// Which resolution step produced the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSource {
    Explicit,
    Session,
    SystemDefault,
}

impl fmt::Display for AgentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSource::Explicit => write!(f, "explicit"),
            AgentSource::Session => write!(f, "session"),
            AgentSource::SystemDefault => write!(f, "system_default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgent {
    pub agent: Agent,
    pub source: AgentSource,
}

/// Id of a workspace's fallback agent.
pub fn system_default_agent_id(workspace_id: &str) -> String {
    format!("system-default@{}", workspace_id)
}

fn resolution_failed(e: StoreError) -> EngineError {
    EngineError::ResolutionFailed {
        reason: e.to_string(),
    }
}

pub struct AgentContextResolver {
    agents: Arc<dyn RecordStore<Agent>>,
    bindings: Arc<dyn RecordStore<SessionBinding>>,
    default_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentContextResolver {
    pub fn new(
        agents: Arc<dyn RecordStore<Agent>>,
        bindings: Arc<dyn RecordStore<SessionBinding>>,
    ) -> Self {
        Self {
            agents,
            bindings,
            default_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(
        &self,
        agent_id: Option<&str>,
        session_id: Option<&str>,
        workspace_id: &str,
        default_confidence: Option<f64>,
    ) -> Result<ResolvedAgent, EngineError> {
        if let Some(id) = agent_id {
            return match self.agents.get(id).map_err(resolution_failed)? {
                Some(agent) => Ok(ResolvedAgent {
                    agent,
                    source: AgentSource::Explicit,
                }),
                None => Err(EngineError::AgentNotFound(id.to_string())),
            };
        }

        if let Some(session_id) = session_id {
            if let Some(binding) = self.bindings.get(session_id).map_err(resolution_failed)? {
                match self.agents.get(&binding.agent_id).map_err(resolution_failed)? {
                    Some(agent) => {
                        return Ok(ResolvedAgent {
                            agent,
                            source: AgentSource::Session,
                        })
                    }
                    None => tracing::warn!(
                        session_id,
                        agent_id = %binding.agent_id,
                        "session is bound to a missing agent, falling back to workspace default"
                    ),
                }
            }
        }

        let agent = self.system_default(workspace_id, default_confidence)?;
        Ok(ResolvedAgent {
            agent,
            source: AgentSource::SystemDefault,
        })
    }

    /// Bind `agent_id` to `session_id` for later fallback resolution.
    pub fn set_session_agent(&self, session_id: &str, agent_id: &str) -> Result<(), EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::InvalidTrigger {
                reason: "session_id is empty".to_string(),
            });
        }
        if self.agents.get(agent_id)?.is_none() {
            return Err(EngineError::AgentNotFound(agent_id.to_string()));
        }
        self.bindings.save(&SessionBinding {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            bound_at: Utc::now(),
        })?;
        tracing::info!(session_id, agent_id, "session bound to agent");
        Ok(())
    }

    /// The workspace fallback agent, created once per workspace even under
    /// concurrent first use.
    fn system_default(
        &self,
        workspace_id: &str,
        default_confidence: Option<f64>,
    ) -> Result<Agent, EngineError> {
        let lock = self
            .default_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(workspace_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let id = system_default_agent_id(workspace_id);
        if let Some(agent) = self.agents.get(&id).map_err(resolution_failed)? {
            return Ok(agent);
        }

        let mut agent = Agent::new(
            id.clone(),
            format!("System default ({})", workspace_id),
            workspace_id,
        );
        agent.system_default = true;
        agent.confidence = default_confidence;
        self.agents.save(&agent).map_err(resolution_failed)?;
        tracing::info!(agent_id = %id, workspace_id, "created system-default agent");
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_store::MemoryStore;

    /// Agent store whose reads always fail.
    struct BrokenStore;

    impl RecordStore<Agent> for BrokenStore {
        fn save(&self, _: &Agent) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("agent db down".into()))
        }
        fn get(&self, _: &str) -> Result<Option<Agent>, StoreError> {
            Err(StoreError::Unavailable("agent db down".into()))
        }
        fn list(&self) -> Result<Vec<Agent>, StoreError> {
            Err(StoreError::Unavailable("agent db down".into()))
        }
        fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("agent db down".into()))
        }
    }

    fn resolver() -> (AgentContextResolver, Arc<MemoryStore<Agent>>) {
        let agents = Arc::new(MemoryStore::new());
        let r = AgentContextResolver::new(agents.clone(), Arc::new(MemoryStore::new()));
        (r, agents)
    }

    #[test]
    fn explicit_agent_wins() {
        let (r, agents) = resolver();
        agents.save(&Agent::new("a-1", "Mailer", "ws")).unwrap();
        agents.save(&Agent::new("a-2", "Other", "ws")).unwrap();
        r.set_session_agent("chat-1", "a-2").unwrap();

        let resolved = r.resolve(Some("a-1"), Some("chat-1"), "ws", None).unwrap();
        assert_eq!(resolved.agent.agent_id, "a-1");
        assert_eq!(resolved.source, AgentSource::Explicit);
    }

    #[test]
    fn unknown_explicit_agent_is_not_found() {
        let (r, _) = resolver();
        let err = r.resolve(Some("ghost"), None, "ws", None).unwrap_err();
        assert!(matches!(err, EngineError::AgentNotFound(id) if id == "ghost"));
    }

    #[test]
    fn session_binding_is_used_without_explicit_id() {
        let (r, agents) = resolver();
        agents.save(&Agent::new("a-2", "Other", "ws")).unwrap();
        r.set_session_agent("chat-1", "a-2").unwrap();

        let resolved = r.resolve(None, Some("chat-1"), "ws", None).unwrap();
        assert_eq!(resolved.agent.agent_id, "a-2");
        assert_eq!(resolved.source, AgentSource::Session);
    }

    #[test]
    fn binding_requires_existing_agent() {
        let (r, _) = resolver();
        assert!(matches!(
            r.set_session_agent("chat-1", "ghost"),
            Err(EngineError::AgentNotFound(_))
        ));
    }

    #[test]
    fn stale_binding_falls_through_to_default() {
        let (r, agents) = resolver();
        agents.save(&Agent::new("a-2", "Other", "ws")).unwrap();
        r.set_session_agent("chat-1", "a-2").unwrap();
        agents.delete("a-2").unwrap();

        let resolved = r.resolve(None, Some("chat-1"), "ws", None).unwrap();
        assert_eq!(resolved.source, AgentSource::SystemDefault);
        assert_eq!(resolved.agent.agent_id, "system-default@ws");
    }

    #[test]
    fn system_default_is_created_once_and_persisted() {
        let (r, agents) = resolver();
        let first = r.resolve(None, None, "ws", Some(0.3)).unwrap();
        assert!(first.agent.system_default);
        assert_eq!(first.agent.confidence, Some(0.3));

        let second = r.resolve(None, None, "ws", Some(0.9)).unwrap();
        assert_eq!(second.agent, first.agent);
        assert_eq!(agents.list().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_first_use_creates_one_default() {
        let (r, agents) = resolver();
        let r = Arc::new(r);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = r.clone();
                std::thread::spawn(move || r.resolve(None, None, "ws", None).unwrap())
            })
            .collect();
        let created: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(created.windows(2).all(|w| w[0].agent == w[1].agent));
        assert_eq!(agents.list().unwrap().len(), 1);
    }

    #[test]
    fn store_errors_become_resolution_failed() {
        let r = AgentContextResolver::new(Arc::new(BrokenStore), Arc::new(MemoryStore::new()));
        assert!(matches!(
            r.resolve(Some("a-1"), None, "ws", None),
            Err(EngineError::ResolutionFailed { .. })
        ));
        assert!(matches!(
            r.resolve(None, None, "ws", None),
            Err(EngineError::ResolutionFailed { .. })
        ));
    }
}
