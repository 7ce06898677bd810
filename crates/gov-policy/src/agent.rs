// agent.rs — Agent identity and maturity tiers.
//
// An agent carries a continuous confidence score. Its maturity tier is never
// stored: it is recomputed from the score by MaturityClassifier, so the two
// cannot drift apart. Graduation moves the score, not the tier.

use std::fmt;

use chrono::{DateTime, Utc};
use gov_store::Record;
use serde::{Deserialize, Serialize};

/// Discrete capability tier derived from an agent's confidence score.
///
/// Variants are declared least to most trusted, so `Ord` compares trust.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MaturityLevel {
    /// Automated actions are blocked and redirected to training.
    Student,
    /// Every action needs human approval.
    Intern,
    /// Low-risk actions run; high-risk actions run under live supervision.
    Supervised,
    /// Actions run directly.
    Autonomous,
}

impl MaturityLevel {
    /// The next tier up, or None at the top.
    pub fn next(self) -> Option<MaturityLevel> {
        match self {
            MaturityLevel::Student => Some(MaturityLevel::Intern),
            MaturityLevel::Intern => Some(MaturityLevel::Supervised),
            MaturityLevel::Supervised => Some(MaturityLevel::Autonomous),
            MaturityLevel::Autonomous => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MaturityLevel::Student => "student",
            MaturityLevel::Intern => "intern",
            MaturityLevel::Supervised => "supervised",
            MaturityLevel::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for MaturityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MaturityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(MaturityLevel::Student),
            "intern" => Ok(MaturityLevel::Intern),
            "supervised" => Ok(MaturityLevel::Supervised),
            "autonomous" => Ok(MaturityLevel::Autonomous),
            other => Err(format!("unknown maturity level '{}'", other)),
        }
    }
}

/// An agent known to the governance engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    /// Stable identifier (also the storage key).
    pub agent_id: String,

    /// Human-readable name.
    pub name: String,

    /// Workspace the agent belongs to.
    pub workspace_id: String,

    /// Confidence in [0, 1]. None means "never scored" and classifies as STUDENT.
    #[serde(default)]
    pub confidence: Option<f64>,

    /// Permission classes held by this agent (e.g., "email", "finance").
    #[serde(default)]
    pub permissions: Vec<String>,

    /// True for the lazily created per-workspace fallback agent.
    #[serde(default)]
    pub system_default: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            workspace_id: workspace_id.into(),
            confidence: None,
            permissions: Vec::new(),
            system_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set the confidence score.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Builder: grant a permission class.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Move the confidence score by `delta`, clamped to [0, 1].
    ///
    /// An unscored agent starts from 0.
    pub fn adjust_confidence(&mut self, delta: f64) {
        let current = self.confidence.filter(|c| c.is_finite()).unwrap_or(0.0);
        self.confidence = Some((current + delta).clamp(0.0, 1.0));
        self.updated_at = Utc::now();
    }
}

impl Record for Agent {
    fn record_id(&self) -> String {
        self.agent_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maturity_orders_by_trust() {
        assert!(MaturityLevel::Student < MaturityLevel::Intern);
        assert!(MaturityLevel::Supervised < MaturityLevel::Autonomous);
        assert_eq!(MaturityLevel::Intern.next(), Some(MaturityLevel::Supervised));
        assert_eq!(MaturityLevel::Autonomous.next(), None);
    }

    #[test]
    fn maturity_parses_case_insensitively() {
        assert_eq!(
            "SUPERVISED".parse::<MaturityLevel>().unwrap(),
            MaturityLevel::Supervised
        );
        assert!("expert".parse::<MaturityLevel>().is_err());
    }

    #[test]
    fn adjust_confidence_clamps() {
        let mut agent = Agent::new("a", "A", "ws").with_confidence(0.99);
        agent.adjust_confidence(0.05);
        assert_eq!(agent.confidence, Some(1.0));

        let mut fresh = Agent::new("b", "B", "ws");
        fresh.adjust_confidence(-0.02);
        assert_eq!(fresh.confidence, Some(0.0));
    }

    #[test]
    fn agent_json_defaults_for_optional_fields() {
        let json = r#"{
            "agent_id": "a-1",
            "name": "Mailer",
            "workspace_id": "ws",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let agent: Agent = serde_json::from_str(json).unwrap();
        assert!(agent.confidence.is_none());
        assert!(agent.permissions.is_empty());
        assert!(!agent.system_default);
    }
}
