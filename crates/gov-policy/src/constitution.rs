// constitution.rs — Constitutional rules and the validator that applies them.
//
// Rules are data: a rule id plus one constraint from a closed set of typed
// evaluators. Nothing in a rule file is executed. A rule set is stored as
// YAML at `.gov/constitution.yaml`:
//
// ```yaml
// rules:
//   - rule_id: no-prod-drops
//     description: Never drop production tables
//     constraint:
//       type: forbidden_action
//       patterns: ["drop_*"]
//   - rule_id: payment-cap
//     constraint:
//       type: numeric_limit
//       action_pattern: "send_payment"
//       field: amount
//       max: 500
//     enforcement: warning
// ```
//
// The validator fails closed: a malformed rule is reported as a violation,
// never skipped.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{Agent, MaturityLevel};
use crate::complexity::ComplexityTier;
use crate::error::PolicyError;
use crate::history::AgentHistory;

/// How a rule violation is enforced.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// The violation is reported but the action stays compliant.
    Warning,
    /// The violation makes the action non-compliant.
    #[default]
    Error,
}

impl std::fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnforcementMode::Warning => write!(f, "warning"),
            EnforcementMode::Error => write!(f, "error"),
        }
    }
}

/// The closed set of constraint evaluators.
///
/// Every `action_pattern` / `patterns` entry is a glob matched against the
/// action type. `field` is a dotted path into the action payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// Matching action types are never allowed.
    ForbiddenAction { patterns: Vec<String> },
    /// Actions above `max` complexity are forbidden, optionally only for
    /// agents below `below_maturity`.
    MaxComplexity {
        max: ComplexityTier,
        #[serde(default)]
        below_maturity: Option<MaturityLevel>,
    },
    /// Matching actions must carry a non-null `field`.
    RequireField { action_pattern: String, field: String },
    /// Matching actions must not set `field` to any of `values`.
    ForbidValues {
        action_pattern: String,
        field: String,
        values: Vec<Value>,
    },
    /// If present, `field` must be a number no greater than `max`.
    NumericLimit {
        action_pattern: String,
        field: String,
        max: f64,
    },
    /// Matching actions need an agent confidence of at least `min`.
    MinConfidence { action_pattern: String, min: f64 },
}

/// One constitutional rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstitutionalRule {
    pub rule_id: String,
    #[serde(default)]
    pub description: String,
    pub constraint: Constraint,
    #[serde(default)]
    pub enforcement: EnforcementMode,
}

/// The action being checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    pub agent_id: String,
    pub action_type: String,
    pub complexity: ComplexityTier,
    pub maturity: MaturityLevel,
    pub confidence: Option<f64>,
    pub payload: Value,
}

/// Result of a static rule check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCheck {
    pub valid: bool,
    pub reason: Option<String>,
}

impl RuleCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub rule_id: String,
    pub reason: String,
}

/// Result of checking an action against the active rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCompliance {
    pub compliant: bool,
    /// The first error-mode violation, if any.
    pub violation: Option<Violation>,
    /// Warning-mode violations. These never affect `compliant`.
    pub warnings: Vec<Violation>,
}

/// Thresholds consulted by graduation eligibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraduationCriteria {
    #[serde(default = "default_evaluation_window_days")]
    pub evaluation_window_days: u32,
    #[serde(default = "default_min_successful_executions")]
    pub min_successful_executions: u64,
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,
}

fn default_evaluation_window_days() -> u32 {
    30
}

fn default_min_successful_executions() -> u64 {
    5
}

fn default_max_failure_rate() -> f64 {
    0.2
}

impl Default for GraduationCriteria {
    fn default() -> Self {
        Self {
            evaluation_window_days: default_evaluation_window_days(),
            min_successful_executions: default_min_successful_executions(),
            max_failure_rate: default_max_failure_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraduationVerdict {
    pub eligible: bool,
    pub blocking_reasons: Vec<String>,
}

/// A set of constitutional rules, evaluated in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<ConstitutionalRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ConstitutionalRule>) -> Self {
        Self { rules }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let data = fs::read_to_string(path).map_err(|source| PolicyError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&data)
    }

    /// Load the file, or an empty rule set if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, PolicyError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), PolicyError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PolicyError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).map_err(|source| PolicyError::IoError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rules that fail static validation, with the reason.
    pub fn invalid_rules(&self) -> Vec<(String, String)> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let check = ConstitutionalValidator::validate_rule(rule);
                check
                    .reason
                    .filter(|_| !check.valid)
                    .map(|reason| (rule.rule_id.clone(), reason))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Applies a rule set to actions and agents.
#[derive(Debug, Clone, Default)]
pub struct ConstitutionalValidator {
    rules: RuleSet,
}

impl ConstitutionalValidator {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Static well-formedness of a single rule.
    pub fn validate_rule(rule: &ConstitutionalRule) -> RuleCheck {
        if rule.rule_id.trim().is_empty() {
            return RuleCheck::invalid("rule_id is empty");
        }
        match &rule.constraint {
            Constraint::ForbiddenAction { patterns } => {
                if patterns.is_empty() {
                    return RuleCheck::invalid("forbidden_action needs at least one pattern");
                }
                for p in patterns {
                    if let Err(reason) = check_pattern(p) {
                        return RuleCheck::invalid(reason);
                    }
                }
                RuleCheck::ok()
            }
            Constraint::MaxComplexity { .. } => RuleCheck::ok(),
            Constraint::RequireField {
                action_pattern,
                field,
            } => check_pattern(action_pattern)
                .and_then(|_| check_field(field))
                .map_or_else(RuleCheck::invalid, |_| RuleCheck::ok()),
            Constraint::ForbidValues {
                action_pattern,
                field,
                values,
            } => {
                if values.is_empty() {
                    return RuleCheck::invalid("forbid_values needs at least one value");
                }
                check_pattern(action_pattern)
                    .and_then(|_| check_field(field))
                    .map_or_else(RuleCheck::invalid, |_| RuleCheck::ok())
            }
            Constraint::NumericLimit {
                action_pattern,
                field,
                max,
            } => {
                if !max.is_finite() {
                    return RuleCheck::invalid("numeric_limit max must be finite");
                }
                check_pattern(action_pattern)
                    .and_then(|_| check_field(field))
                    .map_or_else(RuleCheck::invalid, |_| RuleCheck::ok())
            }
            Constraint::MinConfidence {
                action_pattern,
                min,
            } => {
                if !(0.0..=1.0).contains(min) {
                    return RuleCheck::invalid(format!(
                        "min_confidence must lie in [0, 1], got {}",
                        min
                    ));
                }
                check_pattern(action_pattern).map_or_else(RuleCheck::invalid, |_| RuleCheck::ok())
            }
        }
    }

    /// Check an action against every rule.
    ///
    /// Stops at the first error-mode violation. Warning-mode violations are
    /// collected and logged. A malformed rule is a violation whatever its
    /// enforcement mode.
    pub fn validate_action(&self, action: &ProposedAction) -> ActionCompliance {
        let mut warnings = Vec::new();
        for rule in &self.rules.rules {
            let check = Self::validate_rule(rule);
            if !check.valid {
                let reason = check.reason.unwrap_or_else(|| "malformed rule".to_string());
                tracing::warn!(rule_id = %rule.rule_id, %reason, "malformed constitutional rule, failing closed");
                return ActionCompliance {
                    compliant: false,
                    violation: Some(Violation {
                        rule_id: rule.rule_id.clone(),
                        reason: format!("malformed rule: {}", reason),
                    }),
                    warnings,
                };
            }

            let Some(reason) = evaluate(&rule.constraint, action) else {
                continue;
            };
            let violation = Violation {
                rule_id: rule.rule_id.clone(),
                reason,
            };
            match rule.enforcement {
                EnforcementMode::Warning => {
                    tracing::warn!(
                        rule_id = %violation.rule_id,
                        agent_id = %action.agent_id,
                        action_type = %action.action_type,
                        "constitutional warning: {}",
                        violation.reason
                    );
                    warnings.push(violation);
                }
                EnforcementMode::Error => {
                    return ActionCompliance {
                        compliant: false,
                        violation: Some(violation),
                        warnings,
                    };
                }
            }
        }
        ActionCompliance {
            compliant: true,
            violation: None,
            warnings,
        }
    }

    /// Whether `agent` may move from `current` to `target`.
    ///
    /// An unresolved correction made while the agent was SUPERVISED inside
    /// the evaluation window always blocks. A history read failure blocks.
    pub fn check_graduation_eligibility(
        &self,
        agent: &Agent,
        current: MaturityLevel,
        target: MaturityLevel,
        history: &dyn AgentHistory,
        criteria: &GraduationCriteria,
        now: DateTime<Utc>,
    ) -> GraduationVerdict {
        let mut blocking = Vec::new();
        let window_start = Duration::try_days(i64::from(criteria.evaluation_window_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        if current.next() != Some(target) {
            blocking.push(format!(
                "target tier {} is not the next tier above {}",
                target, current
            ));
        }

        match history.interventions(&agent.agent_id, window_start) {
            Ok(records) => {
                for r in records.iter().filter(|r| {
                    r.maturity_at_intervention == MaturityLevel::Supervised && !r.is_resolved()
                }) {
                    blocking.push(format!(
                        "unresolved supervised-tier correction {} from {}",
                        r.intervention_id,
                        r.recorded_at.format("%Y-%m-%d")
                    ));
                }
            }
            Err(e) => blocking.push(format!("intervention history unavailable: {}", e)),
        }

        match history.outcome_stats(&agent.agent_id, None, Some(window_start)) {
            Ok(stats) => {
                if stats.successes < criteria.min_successful_executions {
                    blocking.push(format!(
                        "{} successful executions in the last {} days, {} required",
                        stats.successes,
                        criteria.evaluation_window_days,
                        criteria.min_successful_executions
                    ));
                }
                if let Some(rate) = stats.failure_rate() {
                    if rate > criteria.max_failure_rate {
                        blocking.push(format!(
                            "failure rate {:.2} exceeds maximum {:.2}",
                            rate, criteria.max_failure_rate
                        ));
                    }
                }
            }
            Err(e) => blocking.push(format!("outcome history unavailable: {}", e)),
        }

        GraduationVerdict {
            eligible: blocking.is_empty(),
            blocking_reasons: blocking,
        }
    }
}

fn check_pattern(pattern: &str) -> Result<(), String> {
    if pattern.trim().is_empty() {
        return Err("action pattern is empty".to_string());
    }
    glob::Pattern::new(pattern)
        .map(|_| ())
        .map_err(|e| format!("invalid action pattern '{}': {}", pattern, e))
}

fn check_field(field: &str) -> Result<(), String> {
    if field.is_empty() || field.split('.').any(str::is_empty) {
        return Err(format!("invalid field path '{}'", field));
    }
    Ok(())
}

fn pattern_matches(pattern: &str, action_type: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(action_type),
        Err(_) => false,
    }
}

/// Walk a dotted path through nested objects.
fn lookup_field<'a>(payload: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(payload, |value, key| value.as_object()?.get(key))
}

/// Evaluate one well-formed constraint. Some(reason) means violated.
fn evaluate(constraint: &Constraint, action: &ProposedAction) -> Option<String> {
    match constraint {
        Constraint::ForbiddenAction { patterns } => patterns
            .iter()
            .find(|p| pattern_matches(p, &action.action_type))
            .map(|p| format!("action '{}' matches forbidden pattern '{}'", action.action_type, p)),
        Constraint::MaxComplexity {
            max,
            below_maturity,
        } => {
            let applies = below_maturity.map_or(true, |floor| action.maturity < floor);
            (applies && action.complexity > *max).then(|| {
                format!(
                    "complexity {} exceeds maximum {} for {} agents",
                    action.complexity, max, action.maturity
                )
            })
        }
        Constraint::RequireField {
            action_pattern,
            field,
        } => {
            if !pattern_matches(action_pattern, &action.action_type) {
                return None;
            }
            match lookup_field(&action.payload, field) {
                Some(v) if !v.is_null() => None,
                _ => Some(format!("required field '{}' is missing", field)),
            }
        }
        Constraint::ForbidValues {
            action_pattern,
            field,
            values,
        } => {
            if !pattern_matches(action_pattern, &action.action_type) {
                return None;
            }
            let value = lookup_field(&action.payload, field)?;
            values
                .contains(value)
                .then(|| format!("field '{}' has forbidden value {}", field, value))
        }
        Constraint::NumericLimit {
            action_pattern,
            field,
            max,
        } => {
            if !pattern_matches(action_pattern, &action.action_type) {
                return None;
            }
            let value = lookup_field(&action.payload, field)?;
            match value.as_f64() {
                Some(n) if n <= *max => None,
                Some(n) => Some(format!("field '{}' = {} exceeds limit {}", field, n, max)),
                None => Some(format!("field '{}' is not a number", field)),
            }
        }
        Constraint::MinConfidence {
            action_pattern,
            min,
        } => {
            if !pattern_matches(action_pattern, &action.action_type) {
                return None;
            }
            match action.confidence {
                Some(c) if c.is_finite() && c >= *min => None,
                Some(c) => Some(format!("agent confidence {:.2} below required {:.2}", c, min)),
                None => Some(format!("agent has no confidence score, {:.2} required", min)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{InterventionRecord, MemoryHistory};
    use serde_json::json;
    use uuid::Uuid;

    fn action(action_type: &str, payload: Value) -> ProposedAction {
        ProposedAction {
            agent_id: "agent-1".to_string(),
            action_type: action_type.to_string(),
            complexity: ComplexityTier::Moderate,
            maturity: MaturityLevel::Supervised,
            confidence: Some(0.75),
            payload,
        }
    }

    fn rule(id: &str, constraint: Constraint) -> ConstitutionalRule {
        ConstitutionalRule {
            rule_id: id.to_string(),
            description: String::new(),
            constraint,
            enforcement: EnforcementMode::Error,
        }
    }

    fn validator(rules: Vec<ConstitutionalRule>) -> ConstitutionalValidator {
        ConstitutionalValidator::new(RuleSet::new(rules))
    }

    // ── Rule well-formedness ──

    #[test]
    fn validate_rule_rejects_bad_patterns_and_fields() {
        let bad_glob = rule(
            "r1",
            Constraint::ForbiddenAction {
                patterns: vec!["drop_[".to_string()],
            },
        );
        assert!(!ConstitutionalValidator::validate_rule(&bad_glob).valid);

        let bad_field = rule(
            "r2",
            Constraint::RequireField {
                action_pattern: "*".to_string(),
                field: "a..b".to_string(),
            },
        );
        assert!(!ConstitutionalValidator::validate_rule(&bad_field).valid);

        let bad_min = rule(
            "r3",
            Constraint::MinConfidence {
                action_pattern: "*".to_string(),
                min: 1.5,
            },
        );
        assert!(!ConstitutionalValidator::validate_rule(&bad_min).valid);

        let good = rule(
            "r4",
            Constraint::NumericLimit {
                action_pattern: "send_payment".to_string(),
                field: "amount".to_string(),
                max: 500.0,
            },
        );
        assert_eq!(ConstitutionalValidator::validate_rule(&good), RuleCheck::ok());
    }

    // ── Action compliance ──

    #[test]
    fn empty_rule_set_is_compliant() {
        let result = validator(vec![]).validate_action(&action("deploy", json!({})));
        assert!(result.compliant);
        assert!(result.violation.is_none());
    }

    #[test]
    fn forbidden_action_glob() {
        let v = validator(vec![rule(
            "no-drops",
            Constraint::ForbiddenAction {
                patterns: vec!["drop_*".to_string()],
            },
        )]);
        let result = v.validate_action(&action("drop_table", json!({})));
        assert!(!result.compliant);
        assert_eq!(result.violation.unwrap().rule_id, "no-drops");
        assert!(v.validate_action(&action("read_data", json!({}))).compliant);
    }

    #[test]
    fn numeric_limit_and_nested_fields() {
        let v = validator(vec![rule(
            "cap",
            Constraint::NumericLimit {
                action_pattern: "send_payment".to_string(),
                field: "payment.amount".to_string(),
                max: 500.0,
            },
        )]);
        assert!(v
            .validate_action(&action("send_payment", json!({"payment": {"amount": 120}})))
            .compliant);
        assert!(!v
            .validate_action(&action("send_payment", json!({"payment": {"amount": 900}})))
            .compliant);
        assert!(!v
            .validate_action(&action("send_payment", json!({"payment": {"amount": "lots"}})))
            .compliant);
        // Absent field passes the limit check.
        assert!(v.validate_action(&action("send_payment", json!({}))).compliant);
    }

    #[test]
    fn require_field_and_forbid_values() {
        let v = validator(vec![
            rule(
                "needs-to",
                Constraint::RequireField {
                    action_pattern: "send_*".to_string(),
                    field: "to".to_string(),
                },
            ),
            rule(
                "no-all-staff",
                Constraint::ForbidValues {
                    action_pattern: "send_email".to_string(),
                    field: "to".to_string(),
                    values: vec![json!("all@corp.example")],
                },
            ),
        ]);
        assert!(!v.validate_action(&action("send_email", json!({}))).compliant);
        let result = v.validate_action(&action("send_email", json!({"to": "all@corp.example"})));
        assert_eq!(result.violation.unwrap().rule_id, "no-all-staff");
        assert!(v
            .validate_action(&action("send_email", json!({"to": "ops@corp.example"})))
            .compliant);
    }

    #[test]
    fn max_complexity_scoped_by_maturity() {
        let v = validator(vec![rule(
            "no-critical-below-autonomous",
            Constraint::MaxComplexity {
                max: ComplexityTier::High,
                below_maturity: Some(MaturityLevel::Autonomous),
            },
        )]);
        let mut a = action("delete_dataset", json!({}));
        a.complexity = ComplexityTier::Critical;
        assert!(!v.validate_action(&a).compliant);
        a.maturity = MaturityLevel::Autonomous;
        assert!(v.validate_action(&a).compliant);
    }

    #[test]
    fn warning_mode_does_not_block() {
        let mut r = rule(
            "min-conf",
            Constraint::MinConfidence {
                action_pattern: "*".to_string(),
                min: 0.9,
            },
        );
        r.enforcement = EnforcementMode::Warning;
        let result = validator(vec![r]).validate_action(&action("read_data", json!({})));
        assert!(result.compliant);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn malformed_rule_fails_closed_even_in_warning_mode() {
        let mut r = rule(
            "broken",
            Constraint::ForbiddenAction { patterns: vec![] },
        );
        r.enforcement = EnforcementMode::Warning;
        let result = validator(vec![r]).validate_action(&action("read_data", json!({})));
        assert!(!result.compliant);
        assert!(result.violation.unwrap().reason.starts_with("malformed rule"));
    }

    // ── Rule set YAML ──

    #[test]
    fn rule_set_yaml_round_trip_and_defaults() {
        let yaml = r#"
rules:
  - rule_id: no-drops
    constraint:
      type: forbidden_action
      patterns: ["drop_*"]
  - rule_id: cap
    constraint:
      type: numeric_limit
      action_pattern: send_payment
      field: amount
      max: 500
    enforcement: warning
"#;
        let set = RuleSet::from_yaml(yaml).unwrap();
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[0].enforcement, EnforcementMode::Error);
        assert_eq!(set.rules[1].enforcement, EnforcementMode::Warning);
        assert!(set.invalid_rules().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gov").join("constitution.yaml");
        set.save(&path).unwrap();
        assert_eq!(RuleSet::load(&path).unwrap(), set);
    }

    #[test]
    fn missing_rule_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = RuleSet::load_or_default(&dir.path().join("nope.yaml")).unwrap();
        assert!(set.is_empty());
    }

    // ── Graduation eligibility ──

    fn seasoned_history(agent_id: &str, successes: u32, failures: u32) -> MemoryHistory {
        let h = MemoryHistory::new();
        let now = Utc::now();
        for _ in 0..successes {
            h.record_outcome(agent_id, "send_email", true, now).unwrap();
        }
        for _ in 0..failures {
            h.record_outcome(agent_id, "send_email", false, now).unwrap();
        }
        h
    }

    #[test]
    fn eligible_with_clean_history() {
        let agent = Agent::new("agent-1", "A", "ws").with_confidence(0.8);
        let h = seasoned_history("agent-1", 10, 1);
        let verdict = ConstitutionalValidator::default().check_graduation_eligibility(
            &agent,
            MaturityLevel::Supervised,
            MaturityLevel::Autonomous,
            &h,
            &GraduationCriteria::default(),
            Utc::now(),
        );
        assert!(verdict.eligible, "{:?}", verdict.blocking_reasons);
    }

    #[test]
    fn unbounded_window_covers_all_history() {
        let agent = Agent::new("agent-1", "A", "ws").with_confidence(0.8);
        let h = seasoned_history("agent-1", 10, 1);
        let criteria = GraduationCriteria {
            evaluation_window_days: u32::MAX,
            ..GraduationCriteria::default()
        };
        let verdict = ConstitutionalValidator::default().check_graduation_eligibility(
            &agent,
            MaturityLevel::Supervised,
            MaturityLevel::Autonomous,
            &h,
            &criteria,
            Utc::now(),
        );
        assert!(verdict.eligible, "{:?}", verdict.blocking_reasons);
    }

    #[test]
    fn unresolved_supervised_correction_blocks() {
        let agent = Agent::new("agent-1", "A", "ws").with_confidence(0.8);
        let h = seasoned_history("agent-1", 10, 0);
        h.record_intervention(InterventionRecord {
            intervention_id: Uuid::new_v4(),
            agent_id: "agent-1".to_string(),
            session_id: Uuid::new_v4(),
            maturity_at_intervention: MaturityLevel::Supervised,
            description: "wrong table".to_string(),
            recorded_at: Utc::now() - Duration::days(3),
            resolved_at: None,
        })
        .unwrap();

        let verdict = ConstitutionalValidator::default().check_graduation_eligibility(
            &agent,
            MaturityLevel::Supervised,
            MaturityLevel::Autonomous,
            &h,
            &GraduationCriteria::default(),
            Utc::now(),
        );
        assert!(!verdict.eligible);
        assert!(verdict.blocking_reasons[0].contains("unresolved supervised-tier correction"));
    }

    #[test]
    fn skipping_tiers_and_thin_history_block() {
        let agent = Agent::new("agent-1", "A", "ws").with_confidence(0.3);
        let h = seasoned_history("agent-1", 1, 3);
        let verdict = ConstitutionalValidator::default().check_graduation_eligibility(
            &agent,
            MaturityLevel::Student,
            MaturityLevel::Supervised,
            &h,
            &GraduationCriteria::default(),
            Utc::now(),
        );
        assert!(!verdict.eligible);
        assert_eq!(verdict.blocking_reasons.len(), 3);
    }
}
