// config.rs — Engine configuration, the `.gov/` layout, and the live handle.
//
// EngineConfig is read from `.gov/governance.toml`. Every section carries
// serde defaults, so an empty file yields the stock configuration.
//
// ConfigHandle holds the active configuration behind an Arc. Operations take
// one snapshot at their start and use it throughout; a reload swaps the Arc
// and never touches a snapshot already handed out.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use gov_audit::AuditRetryPolicy;
use gov_policy::{
    ActionProfile, ComplexityRegistry, ConstitutionalValidator, GraduationCriteria,
    MaturityThresholds, RuleSet,
};
use gov_recovery::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Proposal approval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposalConfig {
    /// Proposals scoring above this are not approvable.
    #[serde(default = "default_risk_ceiling")]
    pub risk_ceiling: f64,
    /// Approval window for new proposals.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u64,
    /// How often the background sweeper runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_risk_ceiling() -> f64 {
    0.75
}

fn default_expiry_hours() -> u64 {
    24
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            risk_ceiling: default_risk_ceiling(),
            expiry_hours: default_expiry_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupervisionConfig {
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: u64,
}

fn default_session_timeout_minutes() -> u64 {
    60
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: default_session_timeout_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a cached maturity tier.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Settings for lazily created system-default agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentDefaults {
    /// Confidence given to a new system-default agent. Unset means STUDENT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_confidence: Option<f64>,
}

/// Full engine configuration, as read from `governance.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub maturity: MaturityThresholds,

    /// Complexity registry overrides, layered on the built-in catalogue.
    #[serde(default)]
    pub complexity: BTreeMap<String, ActionProfile>,

    #[serde(default)]
    pub proposals: ProposalConfig,

    #[serde(default)]
    pub supervision: SupervisionConfig,

    #[serde(default)]
    pub graduation: GraduationCriteria,

    #[serde(default)]
    pub recovery: RetryPolicy,

    #[serde(default)]
    pub audit: AuditRetryPolicy,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub agents: AgentDefaults,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| EngineError::Config(format!("invalid governance.toml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path`, or return the defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("cannot serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        fs::write(path, content)
            .map_err(|e| EngineError::Config(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.maturity
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let ceiling = self.proposals.risk_ceiling;
        if !(0.0..=1.0).contains(&ceiling) {
            return Err(EngineError::Config(format!(
                "proposals.risk_ceiling must be in [0, 1], got {}",
                ceiling
            )));
        }
        if self.proposals.expiry_hours == 0 {
            return Err(EngineError::Config(
                "proposals.expiry_hours must be at least 1".to_string(),
            ));
        }
        if self.proposals.sweep_interval_secs == 0 {
            return Err(EngineError::Config(
                "proposals.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.supervision.session_timeout_minutes == 0 {
            return Err(EngineError::Config(
                "supervision.session_timeout_minutes must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.recovery.jitter_ratio) {
            return Err(EngineError::Config(format!(
                "recovery.jitter_ratio must be in [0, 1], got {}",
                self.recovery.jitter_ratio
            )));
        }
        if self.recovery.base_delay_ms > self.recovery.max_delay_ms {
            return Err(EngineError::Config(format!(
                "recovery.base_delay_ms ({}) exceeds recovery.max_delay_ms ({})",
                self.recovery.base_delay_ms, self.recovery.max_delay_ms
            )));
        }
        let windows = [
            ("proposals.expiry_hours", self.proposals.expiry_hours.saturating_mul(3600)),
            (
                "supervision.session_timeout_minutes",
                self.supervision.session_timeout_minutes.saturating_mul(60),
            ),
            ("cache.ttl_secs", self.cache.ttl_secs),
            (
                "graduation.evaluation_window_days",
                u64::from(self.graduation.evaluation_window_days).saturating_mul(86_400),
            ),
            ("recovery.attempt_timeout_secs", self.recovery.attempt_timeout_secs),
            ("proposals.sweep_interval_secs", self.proposals.sweep_interval_secs),
        ];
        for (field, secs) in windows {
            if secs > MAX_WINDOW_SECS {
                return Err(EngineError::Config(format!(
                    "{} exceeds the 10 year maximum",
                    field
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.graduation.max_failure_rate) {
            return Err(EngineError::Config(format!(
                "graduation.max_failure_rate must be in [0, 1], got {}",
                self.graduation.max_failure_rate
            )));
        }
        if let Some(c) = self.agents.default_confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(EngineError::Config(format!(
                    "agents.default_confidence must be in [0, 1], got {}",
                    c
                )));
            }
        }
        Ok(())
    }

    pub fn proposal_expiry(&self) -> chrono::Duration {
        window(self.proposals.expiry_hours.saturating_mul(3600))
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        window(self.supervision.session_timeout_minutes.saturating_mul(60))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        window(self.cache.ttl_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.proposals.sweep_interval_secs)
    }
}

/// Longest expiry, timeout, or window a configuration may set.
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 86_400;

/// Seconds as a chrono duration, capped at `MAX_WINDOW_SECS`.
fn window(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

/// Where a project keeps its governance state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovPaths {
    pub root: PathBuf,
    pub gov_dir: PathBuf,
    pub config: PathBuf,
    pub constitution: PathBuf,
    pub agents_dir: PathBuf,
    pub proposals_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub bindings_dir: PathBuf,
    pub decisions_dir: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub audit_log: PathBuf,
    pub history: PathBuf,
}

impl GovPaths {
    /// Standard `.gov/` layout under a project root.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let gov_dir = root.join(".gov");
        Self {
            config: gov_dir.join("governance.toml"),
            constitution: gov_dir.join("constitution.yaml"),
            agents_dir: gov_dir.join("agents"),
            proposals_dir: gov_dir.join("proposals"),
            sessions_dir: gov_dir.join("sessions"),
            bindings_dir: gov_dir.join("bindings"),
            decisions_dir: gov_dir.join("decisions"),
            checkpoints_dir: gov_dir.join("checkpoints"),
            audit_log: gov_dir.join("audit.jsonl"),
            history: gov_dir.join("history.json"),
            gov_dir,
            root,
        }
    }
}

/// Configuration plus everything derived from it.
#[derive(Debug)]
pub struct ActiveConfig {
    pub config: EngineConfig,
    pub registry: ComplexityRegistry,
    pub validator: ConstitutionalValidator,
}

impl ActiveConfig {
    fn build(config: EngineConfig, validator: ConstitutionalValidator) -> Self {
        let registry = ComplexityRegistry::with_overrides(config.complexity.iter());
        Self {
            config,
            registry,
            validator,
        }
    }
}

/// Hot-swappable configuration shared by every engine operation.
#[derive(Debug)]
pub struct ConfigHandle {
    active: RwLock<Arc<ActiveConfig>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig, rules: RuleSet) -> Result<Self, EngineError> {
        config.validate()?;
        warn_invalid_rules(&rules);
        Ok(Self {
            active: RwLock::new(Arc::new(ActiveConfig::build(
                config,
                ConstitutionalValidator::new(rules),
            ))),
        })
    }

    /// The configuration in force right now.
    pub fn snapshot(&self) -> Arc<ActiveConfig> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Validate and install a new configuration, keeping the rule set.
    /// Returns the configuration it replaced. On error nothing changes.
    pub fn replace_config(&self, config: EngineConfig) -> Result<Arc<ActiveConfig>, EngineError> {
        config.validate()?;
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(ActiveConfig::build(config, active.validator.clone()));
        Ok(std::mem::replace(&mut *active, next))
    }

    /// Install a new constitutional rule set, keeping the configuration.
    pub fn replace_rules(&self, rules: RuleSet) {
        warn_invalid_rules(&rules);
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(ActiveConfig {
            config: active.config.clone(),
            registry: active.registry.clone(),
            validator: ConstitutionalValidator::new(rules),
        });
        *active = next;
    }
}

// Malformed rules stay in the set: the validator treats them as violations.
fn warn_invalid_rules(rules: &RuleSet) {
    for (rule_id, reason) in rules.invalid_rules() {
        tracing::warn!(rule_id = %rule_id, reason = %reason, "malformed constitutional rule will fail closed");
    }
}
