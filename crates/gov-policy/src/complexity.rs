// complexity.rs — Action Classifier.
//
// A static, extensible registry keyed by action type. Built-in entries can
// be overridden (or extended) from configuration. Unregistered action types
// classify as CRITICAL.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::MaturityLevel;

/// Risk classification of an action type, least to most risky.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Low,
    Moderate,
    High,
    Critical,
}

impl ComplexityTier {
    /// Weight of this tier in proposal risk scoring.
    pub fn risk_weight(self) -> f64 {
        match self {
            ComplexityTier::Low => 0.1,
            ComplexityTier::Moderate => 0.35,
            ComplexityTier::High => 0.65,
            ComplexityTier::Critical => 0.9,
        }
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplexityTier::Low => write!(f, "low"),
            ComplexityTier::Moderate => write!(f, "moderate"),
            ComplexityTier::High => write!(f, "high"),
            ComplexityTier::Critical => write!(f, "critical"),
        }
    }
}

/// Registry entry for one action type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionProfile {
    pub tier: ComplexityTier,

    /// Permission class an agent must hold for this action to be approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,

    /// Lowest maturity allowed to have this action approved. Defaults by tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_maturity: Option<MaturityLevel>,
}

impl ActionProfile {
    pub fn new(tier: ComplexityTier) -> Self {
        Self {
            tier,
            permission: None,
            min_maturity: None,
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// The explicit minimum, or STUDENT for LOW/MODERATE and INTERN above.
    pub fn effective_min_maturity(&self) -> MaturityLevel {
        self.min_maturity.unwrap_or(match self.tier {
            ComplexityTier::Low | ComplexityTier::Moderate => MaturityLevel::Student,
            ComplexityTier::High | ComplexityTier::Critical => MaturityLevel::Intern,
        })
    }
}

const BUILTIN: &[(&str, ComplexityTier, Option<&str>)] = &[
    ("read_data", ComplexityTier::Low, None),
    ("list_files", ComplexityTier::Low, None),
    ("search", ComplexityTier::Low, None),
    ("send_email", ComplexityTier::Moderate, Some("email")),
    ("write_file", ComplexityTier::Moderate, Some("filesystem")),
    ("create_record", ComplexityTier::Moderate, Some("records")),
    ("update_record", ComplexityTier::Moderate, Some("records")),
    ("deploy", ComplexityTier::High, Some("deploy")),
    ("execute_code", ComplexityTier::High, Some("compute")),
    ("send_payment", ComplexityTier::High, Some("finance")),
    ("modify_permissions", ComplexityTier::High, Some("admin")),
    ("delete_dataset", ComplexityTier::Critical, Some("data_admin")),
    ("delete_record", ComplexityTier::Critical, Some("records")),
    ("drop_table", ComplexityTier::Critical, Some("data_admin")),
    ("transfer_funds", ComplexityTier::Critical, Some("finance")),
];

/// Maps action types to complexity tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityRegistry {
    entries: BTreeMap<String, ActionProfile>,
}

fn normalize(action_type: &str) -> String {
    action_type.trim().to_ascii_lowercase()
}

impl ComplexityRegistry {
    /// An empty registry: every action classifies as CRITICAL.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The built-in action catalogue.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for (action, tier, permission) in BUILTIN {
            let mut profile = ActionProfile::new(*tier);
            profile.permission = permission.map(str::to_string);
            registry.register(action, profile);
        }
        registry
    }

    /// Built-ins with `overrides` layered on top.
    pub fn with_overrides<'a, I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a ActionProfile)>,
    {
        let mut registry = Self::with_defaults();
        for (action, profile) in overrides {
            registry.register(action, profile.clone());
        }
        registry
    }

    pub fn register(&mut self, action_type: &str, profile: ActionProfile) {
        self.entries.insert(normalize(action_type), profile);
    }

    pub fn is_registered(&self, action_type: &str) -> bool {
        self.entries.contains_key(&normalize(action_type))
    }

    /// Tier for an action type. Unknown → CRITICAL.
    pub fn classify(&self, action_type: &str) -> ComplexityTier {
        self.profile(action_type).tier
    }

    /// Full profile for an action type. Unknown actions get a bare CRITICAL
    /// profile with no permission class.
    pub fn profile(&self, action_type: &str) -> ActionProfile {
        match self.entries.get(&normalize(action_type)) {
            Some(profile) => profile.clone(),
            None => {
                tracing::debug!(action_type, "unregistered action type, classifying as critical");
                ActionProfile::new(ComplexityTier::Critical)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ActionProfile)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ComplexityRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tiers() {
        let r = ComplexityRegistry::with_defaults();
        assert_eq!(r.classify("read_data"), ComplexityTier::Low);
        assert_eq!(r.classify("send_email"), ComplexityTier::Moderate);
        assert_eq!(r.classify("deploy"), ComplexityTier::High);
        assert_eq!(r.classify("delete_dataset"), ComplexityTier::Critical);
    }

    #[test]
    fn unknown_action_is_critical() {
        let r = ComplexityRegistry::with_defaults();
        assert_eq!(r.classify("launch_rocket"), ComplexityTier::Critical);
        assert!(ComplexityRegistry::empty().classify("read_data") == ComplexityTier::Critical);
    }

    #[test]
    fn lookup_is_normalized() {
        let r = ComplexityRegistry::with_defaults();
        assert_eq!(r.classify("  Read_Data "), ComplexityTier::Low);
    }

    #[test]
    fn overrides_replace_and_extend() {
        let mut overrides = BTreeMap::new();
        overrides.insert("send_email".to_string(), ActionProfile::new(ComplexityTier::High));
        overrides.insert(
            "summarize".to_string(),
            ActionProfile::new(ComplexityTier::Low).with_permission("docs"),
        );
        let r = ComplexityRegistry::with_overrides(&overrides);
        assert_eq!(r.classify("send_email"), ComplexityTier::High);
        assert_eq!(r.classify("summarize"), ComplexityTier::Low);
        assert_eq!(r.profile("summarize").permission.as_deref(), Some("docs"));
    }

    #[test]
    fn default_min_maturity_by_tier() {
        assert_eq!(
            ActionProfile::new(ComplexityTier::Moderate).effective_min_maturity(),
            MaturityLevel::Student
        );
        assert_eq!(
            ActionProfile::new(ComplexityTier::Critical).effective_min_maturity(),
            MaturityLevel::Intern
        );
        let explicit = ActionProfile {
            tier: ComplexityTier::Low,
            permission: None,
            min_maturity: Some(MaturityLevel::Supervised),
        };
        assert_eq!(explicit.effective_min_maturity(), MaturityLevel::Supervised);
    }

    #[test]
    fn profile_parses_from_toml_style_json() {
        let profile: ActionProfile =
            serde_json::from_str(r#"{"tier":"high","permission":"finance"}"#).unwrap();
        assert_eq!(profile.tier, ComplexityTier::High);
        assert!(profile.min_maturity.is_none());
    }
}
