// router.rs — Trigger Router decision function.
//
// Every trigger is routed by one table keyed on (maturity, origin, complexity):
//
//   STUDENT     automated  any            → BLOCK_TO_TRAINING
//   STUDENT     manual     any            → MANUAL_WARN
//   INTERN      any        any            → CREATE_PROPOSAL
//   SUPERVISED  any        LOW/MODERATE   → EXECUTE
//   SUPERVISED  any        HIGH/CRITICAL  → SUPERVISE
//   AUTONOMOUS  any        any            → EXECUTE
//
// The constitutional gate runs only on decisions that would execute right
// away. A non-compliant action is deferred to a human as CREATE_PROPOSAL.
// Nothing here performs I/O; the engine applies the side effects.

use gov_policy::{
    ActionCompliance, ComplexityTier, ConstitutionalValidator, MaturityLevel, ProposedAction,
    Violation,
};

use crate::trigger::{DecisionStep, RoutingDecision, TriggerOrigin};

/// The routing table.
pub fn decide(
    maturity: MaturityLevel,
    origin: TriggerOrigin,
    complexity: ComplexityTier,
) -> RoutingDecision {
    match (maturity, origin, complexity) {
        (MaturityLevel::Student, TriggerOrigin::Automated, _) => RoutingDecision::BlockToTraining,
        (MaturityLevel::Student, TriggerOrigin::Manual, _) => RoutingDecision::ManualWarn,
        (MaturityLevel::Intern, _, _) => RoutingDecision::CreateProposal,
        (MaturityLevel::Supervised, _, ComplexityTier::Low | ComplexityTier::Moderate) => {
            RoutingDecision::Execute
        }
        (MaturityLevel::Supervised, _, ComplexityTier::High | ComplexityTier::Critical) => {
            RoutingDecision::Supervise
        }
        (MaturityLevel::Autonomous, _, _) => RoutingDecision::Execute,
    }
}

/// A routing decision after the constitutional gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub decision: RoutingDecision,
    pub violation: Option<Violation>,
    pub warnings: Vec<Violation>,
    pub steps: Vec<DecisionStep>,
}

/// Apply the table, then the constitutional gate to decisions that execute.
pub fn route(
    action: &ProposedAction,
    origin: TriggerOrigin,
    validator: &ConstitutionalValidator,
) -> Routed {
    let table = decide(action.maturity, origin, action.complexity);
    let mut steps = vec![DecisionStep::new(
        "routing_table",
        format!(
            "{}/{}/{} -> {}",
            action.maturity, origin, action.complexity, table
        ),
    )];

    if !table.executes_inline() {
        steps.push(DecisionStep::new("constitution", "skipped: not executing"));
        return Routed {
            decision: table,
            violation: None,
            warnings: Vec::new(),
            steps,
        };
    }

    let ActionCompliance {
        compliant,
        violation,
        warnings,
    } = validator.validate_action(action);

    for w in &warnings {
        steps.push(DecisionStep::new(
            "constitution",
            format!("warning: {} ({})", w.rule_id, w.reason),
        ));
    }

    match violation {
        Some(v) if !compliant => {
            steps.push(DecisionStep::new(
                "constitution",
                format!("violated: {} ({}) -> {}", v.rule_id, v.reason, RoutingDecision::CreateProposal),
            ));
            Routed {
                decision: RoutingDecision::CreateProposal,
                violation: Some(v),
                warnings,
                steps,
            }
        }
        _ => {
            steps.push(DecisionStep::new("constitution", "compliant"));
            Routed {
                decision: table,
                violation: None,
                warnings,
                steps,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_policy::{ConstitutionalRule, Constraint, EnforcementMode, RuleSet};
    use serde_json::json;

    const LEVELS: [MaturityLevel; 4] = [
        MaturityLevel::Student,
        MaturityLevel::Intern,
        MaturityLevel::Supervised,
        MaturityLevel::Autonomous,
    ];
    const TIERS: [ComplexityTier; 4] = [
        ComplexityTier::Low,
        ComplexityTier::Moderate,
        ComplexityTier::High,
        ComplexityTier::Critical,
    ];
    const ORIGINS: [TriggerOrigin; 2] = [TriggerOrigin::Automated, TriggerOrigin::Manual];

    fn action(maturity: MaturityLevel, action_type: &str, complexity: ComplexityTier) -> ProposedAction {
        ProposedAction {
            agent_id: "agent-1".to_string(),
            action_type: action_type.to_string(),
            complexity,
            maturity,
            confidence: Some(0.95),
            payload: json!({}),
        }
    }

    fn rules(enforcement: EnforcementMode) -> ConstitutionalValidator {
        ConstitutionalValidator::new(RuleSet::new(vec![ConstitutionalRule {
            rule_id: "no-drops".to_string(),
            description: "tables are never dropped by agents".to_string(),
            constraint: Constraint::ForbiddenAction {
                patterns: vec!["drop_*".to_string()],
            },
            enforcement,
        }]))
    }

    #[test]
    fn table_is_total_and_matches_rows() {
        for m in LEVELS {
            for o in ORIGINS {
                for c in TIERS {
                    let d = decide(m, o, c);
                    let expected = match m {
                        MaturityLevel::Student if o == TriggerOrigin::Automated => {
                            RoutingDecision::BlockToTraining
                        }
                        MaturityLevel::Student => RoutingDecision::ManualWarn,
                        MaturityLevel::Intern => RoutingDecision::CreateProposal,
                        MaturityLevel::Supervised if c <= ComplexityTier::Moderate => {
                            RoutingDecision::Execute
                        }
                        MaturityLevel::Supervised => RoutingDecision::Supervise,
                        MaturityLevel::Autonomous => RoutingDecision::Execute,
                    };
                    assert_eq!(d, expected, "{}/{}/{}", m, o, c);
                }
            }
        }
    }

    #[test]
    fn supervised_high_risk_never_executes() {
        for o in ORIGINS {
            for c in [ComplexityTier::High, ComplexityTier::Critical] {
                assert_eq!(decide(MaturityLevel::Supervised, o, c), RoutingDecision::Supervise);
            }
        }
    }

    #[test]
    fn violation_defers_execution_to_proposal() {
        let routed = route(
            &action(MaturityLevel::Autonomous, "drop_table", ComplexityTier::Critical),
            TriggerOrigin::Automated,
            &rules(EnforcementMode::Error),
        );
        assert_eq!(routed.decision, RoutingDecision::CreateProposal);
        assert_eq!(routed.violation.unwrap().rule_id, "no-drops");
    }

    #[test]
    fn manual_warn_is_gated_too() {
        let routed = route(
            &action(MaturityLevel::Student, "drop_table", ComplexityTier::Critical),
            TriggerOrigin::Manual,
            &rules(EnforcementMode::Error),
        );
        assert_eq!(routed.decision, RoutingDecision::CreateProposal);
    }

    #[test]
    fn warning_rules_do_not_change_the_decision() {
        let routed = route(
            &action(MaturityLevel::Autonomous, "drop_table", ComplexityTier::Critical),
            TriggerOrigin::Automated,
            &rules(EnforcementMode::Warning),
        );
        assert_eq!(routed.decision, RoutingDecision::Execute);
        assert_eq!(routed.warnings.len(), 1);
        assert!(routed.violation.is_none());
    }

    #[test]
    fn gate_skips_non_executing_decisions() {
        let routed = route(
            &action(MaturityLevel::Supervised, "drop_table", ComplexityTier::Critical),
            TriggerOrigin::Automated,
            &rules(EnforcementMode::Error),
        );
        assert_eq!(routed.decision, RoutingDecision::Supervise);
        assert!(routed.violation.is_none());
        assert!(routed
            .steps
            .iter()
            .any(|s| s.check == "constitution" && s.outcome.starts_with("skipped")));
    }

    #[test]
    fn empty_rule_set_keeps_the_table() {
        let validator = ConstitutionalValidator::default();
        for m in LEVELS {
            for o in ORIGINS {
                for c in TIERS {
                    let routed = route(&action(m, "read_data", c), o, &validator);
                    assert_eq!(routed.decision, decide(m, o, c));
                }
            }
        }
    }
}
