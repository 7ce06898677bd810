// history.rs — Per-agent execution outcomes and supervision interventions.
//
// Read by proposal scoring (failure frequency) and graduation checks
// (unresolved corrections). Written by the engine after executions and by
// the supervision coordinator on interventions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::MaturityLevel;
use crate::error::PolicyError;

/// A human correction recorded against an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterventionRecord {
    pub intervention_id: Uuid,
    pub agent_id: String,
    pub session_id: Uuid,
    /// The agent's tier when the correction happened.
    pub maturity_at_intervention: MaturityLevel,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl InterventionRecord {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Success/failure counts over some window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeStats {
    pub successes: u64,
    pub failures: u64,
}

impl OutcomeStats {
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Failure fraction, or None with no executions on record.
    pub fn failure_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            n => Some(self.failures as f64 / n as f64),
        }
    }
}

/// Storage for agent outcome and intervention history.
pub trait AgentHistory: Send + Sync {
    fn record_outcome(
        &self,
        agent_id: &str,
        action_type: &str,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<(), PolicyError>;

    /// Counts for an agent, optionally narrowed to one action type and to
    /// outcomes at or after `since`.
    fn outcome_stats(
        &self,
        agent_id: &str,
        action_type: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<OutcomeStats, PolicyError>;

    fn record_intervention(&self, record: InterventionRecord) -> Result<(), PolicyError>;

    /// Mark an intervention resolved. Returns false if it does not exist or
    /// was already resolved.
    fn resolve_intervention(&self, intervention_id: Uuid, at: DateTime<Utc>)
        -> Result<bool, PolicyError>;

    /// Interventions for an agent recorded at or after `since`, oldest first.
    fn interventions(
        &self,
        agent_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InterventionRecord>, PolicyError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Outcome {
    agent_id: String,
    action_type: String,
    success: bool,
    at: DateTime<Utc>,
}

fn stats_of<'a>(
    outcomes: impl Iterator<Item = &'a Outcome>,
    agent_id: &str,
    action_type: Option<&str>,
    since: Option<DateTime<Utc>>,
) -> OutcomeStats {
    let mut stats = OutcomeStats::default();
    for o in outcomes.filter(|o| {
        o.agent_id == agent_id
            && action_type.map_or(true, |a| o.action_type == a)
            && since.map_or(true, |s| o.at >= s)
    }) {
        if o.success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
    }
    stats
}

/// In-process history.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    outcomes: RwLock<Vec<Outcome>>,
    interventions: RwLock<Vec<InterventionRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentHistory for MemoryHistory {
    fn record_outcome(
        &self,
        agent_id: &str,
        action_type: &str,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<(), PolicyError> {
        let mut outcomes = self.outcomes.write().unwrap_or_else(|e| e.into_inner());
        outcomes.push(Outcome {
            agent_id: agent_id.to_string(),
            action_type: action_type.to_string(),
            success,
            at,
        });
        Ok(())
    }

    fn outcome_stats(
        &self,
        agent_id: &str,
        action_type: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<OutcomeStats, PolicyError> {
        let outcomes = self.outcomes.read().unwrap_or_else(|e| e.into_inner());
        Ok(stats_of(outcomes.iter(), agent_id, action_type, since))
    }

    fn record_intervention(&self, record: InterventionRecord) -> Result<(), PolicyError> {
        let mut interventions = self.interventions.write().unwrap_or_else(|e| e.into_inner());
        interventions.push(record);
        Ok(())
    }

    fn resolve_intervention(
        &self,
        intervention_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, PolicyError> {
        let mut interventions = self.interventions.write().unwrap_or_else(|e| e.into_inner());
        match interventions
            .iter_mut()
            .find(|r| r.intervention_id == intervention_id && r.resolved_at.is_none())
        {
            Some(record) => {
                record.resolved_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn interventions(
        &self,
        agent_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InterventionRecord>, PolicyError> {
        let interventions = self.interventions.read().unwrap_or_else(|e| e.into_inner());
        Ok(interventions
            .iter()
            .filter(|r| r.agent_id == agent_id && r.recorded_at >= since)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    outcomes: Vec<Outcome>,
    #[serde(default)]
    interventions: Vec<InterventionRecord>,
}

/// History persisted as a single JSON document, rewritten on every change.
///
/// Suited to the CLI, where each invocation is a separate process.
pub struct JsonFileHistory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HistoryFile, PolicyError> {
        if !self.path.exists() {
            return Ok(HistoryFile::default());
        }
        let data = fs::read_to_string(&self.path).map_err(|source| PolicyError::IoError {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|e| {
            PolicyError::History(format!("corrupt history file {}: {}", self.path.display(), e))
        })
    }

    fn store(&self, file: &HistoryFile) -> Result<(), PolicyError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| PolicyError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| PolicyError::History(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| PolicyError::IoError {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| PolicyError::IoError {
            path: self.path.clone(),
            source,
        })
    }

    fn modify<R>(&self, f: impl FnOnce(&mut HistoryFile) -> R) -> Result<R, PolicyError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;
        let result = f(&mut file);
        self.store(&file)?;
        Ok(result)
    }
}

impl AgentHistory for JsonFileHistory {
    fn record_outcome(
        &self,
        agent_id: &str,
        action_type: &str,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<(), PolicyError> {
        self.modify(|file| {
            file.outcomes.push(Outcome {
                agent_id: agent_id.to_string(),
                action_type: action_type.to_string(),
                success,
                at,
            })
        })
    }

    fn outcome_stats(
        &self,
        agent_id: &str,
        action_type: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<OutcomeStats, PolicyError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let file = self.load()?;
        Ok(stats_of(file.outcomes.iter(), agent_id, action_type, since))
    }

    fn record_intervention(&self, record: InterventionRecord) -> Result<(), PolicyError> {
        self.modify(|file| file.interventions.push(record))
    }

    fn resolve_intervention(
        &self,
        intervention_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, PolicyError> {
        self.modify(|file| {
            match file
                .interventions
                .iter_mut()
                .find(|r| r.intervention_id == intervention_id && r.resolved_at.is_none())
            {
                Some(record) => {
                    record.resolved_at = Some(at);
                    true
                }
                None => false,
            }
        })
    }

    fn interventions(
        &self,
        agent_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InterventionRecord>, PolicyError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let file = self.load()?;
        Ok(file
            .interventions
            .into_iter()
            .filter(|r| r.agent_id == agent_id && r.recorded_at >= since)
            .collect())
    }
}
