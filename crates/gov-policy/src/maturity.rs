// maturity.rs — Maturity Classifier.
//
// Maps a confidence score onto four ordered, non-overlapping bands:
//
//   [0, intern)            → STUDENT
//   [intern, supervised)   → INTERN
//   [supervised, autonomous) → SUPERVISED
//   [autonomous, 1]        → AUTONOMOUS
//
// `classify_score` is the pure function. `classify_cached` layers the
// GovernanceCache on top; it re-reads the agent through a loader after
// observing the cache generation, so a concurrent graduation can never leave
// a pre-graduation tier in the cache.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, MaturityLevel};
use crate::cache::{CacheLookup, GovernanceCache};
use crate::error::PolicyError;

/// Headroom above a tier's lower bound given on graduation. Absorbs two
/// failed executions before the agent falls back a tier.
pub const GRADUATION_MARGIN: f64 = 0.05;

/// Lower bounds of the INTERN, SUPERVISED and AUTONOMOUS bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MaturityThresholds {
    #[serde(default = "default_intern")]
    pub intern: f64,
    #[serde(default = "default_supervised")]
    pub supervised: f64,
    #[serde(default = "default_autonomous")]
    pub autonomous: f64,
}

fn default_intern() -> f64 {
    0.5
}

fn default_supervised() -> f64 {
    0.7
}

fn default_autonomous() -> f64 {
    0.9
}

impl Default for MaturityThresholds {
    fn default() -> Self {
        Self {
            intern: default_intern(),
            supervised: default_supervised(),
            autonomous: default_autonomous(),
        }
    }
}

impl MaturityThresholds {
    /// Check the bands are strictly increasing and inside (0, 1].
    pub fn validate(&self) -> Result<(), PolicyError> {
        let values = [self.intern, self.supervised, self.autonomous];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PolicyError::InvalidThresholds {
                reason: "thresholds must be finite".to_string(),
            });
        }
        if self.intern <= 0.0 || self.autonomous > 1.0 {
            return Err(PolicyError::InvalidThresholds {
                reason: format!(
                    "thresholds must lie in (0, 1], got intern={} autonomous={}",
                    self.intern, self.autonomous
                ),
            });
        }
        if !(self.intern < self.supervised && self.supervised < self.autonomous) {
            return Err(PolicyError::InvalidThresholds {
                reason: format!(
                    "thresholds must be strictly increasing, got {} / {} / {}",
                    self.intern, self.supervised, self.autonomous
                ),
            });
        }
        Ok(())
    }

    /// The smallest score that classifies as `level`.
    pub fn lower_bound(&self, level: MaturityLevel) -> f64 {
        match level {
            MaturityLevel::Student => 0.0,
            MaturityLevel::Intern => self.intern,
            MaturityLevel::Supervised => self.supervised,
            MaturityLevel::Autonomous => self.autonomous,
        }
    }

    /// The score an agent is placed at when promoted into `level`: the
    /// lower bound plus [`GRADUATION_MARGIN`], capped at the middle of the
    /// band.
    pub fn graduation_seat(&self, level: MaturityLevel) -> f64 {
        let floor = self.lower_bound(level);
        let ceiling = match level {
            MaturityLevel::Student => self.intern,
            MaturityLevel::Intern => self.supervised,
            MaturityLevel::Supervised => self.autonomous,
            MaturityLevel::Autonomous => 1.0,
        };
        (floor + GRADUATION_MARGIN).min((floor + ceiling) / 2.0)
    }
}

/// Classifies agents into maturity tiers, caching results per agent.
pub struct MaturityClassifier {
    cache: GovernanceCache,
}

impl MaturityClassifier {
    pub fn new() -> Self {
        Self {
            cache: GovernanceCache::new(),
        }
    }

    /// Pure classification of a score. Missing or non-finite → STUDENT.
    pub fn classify_score(thresholds: &MaturityThresholds, score: Option<f64>) -> MaturityLevel {
        let score = match score {
            Some(s) if s.is_finite() => s.clamp(0.0, 1.0),
            _ => return MaturityLevel::Student,
        };
        if score >= thresholds.autonomous {
            MaturityLevel::Autonomous
        } else if score >= thresholds.supervised {
            MaturityLevel::Supervised
        } else if score >= thresholds.intern {
            MaturityLevel::Intern
        } else {
            MaturityLevel::Student
        }
    }

    /// Uncached classification of an agent.
    pub fn classify(thresholds: &MaturityThresholds, agent: &Agent) -> MaturityLevel {
        Self::classify_score(thresholds, agent.confidence)
    }

    /// Classify through the cache.
    ///
    /// On a miss, `load` must return the agent as currently persisted. If it
    /// fails or finds nothing, `fallback` is classified and nothing is
    /// cached. Classification itself never fails.
    pub fn classify_cached<F>(
        &self,
        thresholds: &MaturityThresholds,
        ttl: Duration,
        fallback: &Agent,
        load: F,
    ) -> MaturityLevel
    where
        F: FnOnce() -> Result<Option<Agent>, PolicyError>,
    {
        let agent_id = fallback.agent_id.as_str();
        let generation = match self.cache.lookup(agent_id, thresholds, Utc::now()) {
            CacheLookup::Hit(entry) => return entry.level,
            CacheLookup::Miss { generation } => generation,
        };

        match load() {
            Ok(Some(current)) => {
                let level = Self::classify(thresholds, &current);
                self.cache
                    .populate(agent_id, level, current.confidence, *thresholds, ttl, generation);
                level
            }
            Ok(None) => Self::classify(thresholds, fallback),
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "agent reload failed, classifying snapshot uncached");
                Self::classify(thresholds, fallback)
            }
        }
    }

    /// Drop the cached tier for an agent. Call after any confidence write.
    pub fn invalidate(&self, agent_id: &str) {
        self.cache.invalidate(agent_id);
    }

    /// Drop every cached tier (e.g., after the thresholds change).
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache(&self) -> &GovernanceCache {
        &self.cache
    }
}

impl Default for MaturityClassifier {
    fn default() -> Self {
        Self::new()
    }
}
