// evaluator.rs — Proposal Evaluator: validation, risk scoring, ranking, and
// approval criteria.
//
// Risk score:
//
//   0.5 · complexity_weight + 0.3 · maturity_weight + 0.2 · history_term
//
// history_term is the agent's failure rate for the action type. With no
// history it is 0.6: a neutral 0.5 plus a 0.1 new-agent penalty. A history
// read failure counts as the worst case (1.0).

use std::cmp::Ordering;

use gov_policy::{
    Agent, AgentHistory, ComplexityRegistry, ComplexityTier, MaturityLevel, OutcomeStats,
};
use serde::{Deserialize, Serialize};

use crate::error::ProposalError;
use crate::proposal::{Proposal, ProposalKind};

const COMPLEXITY_FACTOR: f64 = 0.5;
const MATURITY_FACTOR: f64 = 0.3;
const HISTORY_FACTOR: f64 = 0.2;
const NO_HISTORY_TERM: f64 = 0.6;

fn maturity_weight(level: MaturityLevel) -> f64 {
    match level {
        MaturityLevel::Student => 0.9,
        MaturityLevel::Intern => 0.6,
        MaturityLevel::Supervised => 0.3,
        MaturityLevel::Autonomous => 0.1,
    }
}

/// Result of an approval-criteria check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalCheck {
    pub approvable: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProposalEvaluator {
    risk_ceiling: f64,
}

impl ProposalEvaluator {
    pub fn new(risk_ceiling: f64) -> Self {
        Self { risk_ceiling }
    }

    pub fn risk_ceiling(&self) -> f64 {
        self.risk_ceiling
    }

    /// Required-field check. Runs before any scoring.
    pub fn validate(proposal: &Proposal) -> Result<(), ProposalError> {
        let mut missing = Vec::new();
        if proposal.agent_id.trim().is_empty() {
            missing.push("agent_id".to_string());
        }
        if proposal.description.trim().is_empty() {
            missing.push("description".to_string());
        }
        match &proposal.kind {
            ProposalKind::Action { action_type, .. } => {
                if action_type.trim().is_empty() {
                    missing.push("action_type".to_string());
                }
            }
            ProposalKind::Training { reason, .. } => {
                if reason.trim().is_empty() {
                    missing.push("reason".to_string());
                }
            }
        }
        if proposal.expires_at <= proposal.created_at {
            missing.push("expires_at".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProposalError::IncompleteProposal {
                proposal_id: proposal.proposal_id,
                missing,
            })
        }
    }

    /// The pure scoring formula.
    pub fn risk_score(complexity: ComplexityTier, maturity: MaturityLevel, stats: OutcomeStats) -> f64 {
        let history_term = stats.failure_rate().unwrap_or(NO_HISTORY_TERM);
        let score = COMPLEXITY_FACTOR * complexity.risk_weight()
            + MATURITY_FACTOR * maturity_weight(maturity)
            + HISTORY_FACTOR * history_term;
        score.clamp(0.0, 1.0)
    }

    /// Validate, then score a proposal for an agent at `maturity`.
    ///
    /// Training proposals are scored against the action that was blocked,
    /// or as LOW complexity when there is none.
    pub fn score(
        proposal: &Proposal,
        maturity: MaturityLevel,
        registry: &ComplexityRegistry,
        history: &dyn AgentHistory,
    ) -> Result<f64, ProposalError> {
        Self::validate(proposal)?;

        let action_type = proposal.action_type();
        let complexity = match (&proposal.kind, action_type) {
            (_, Some(action)) => registry.classify(action),
            (ProposalKind::Training { .. }, None) => ComplexityTier::Low,
            (ProposalKind::Action { .. }, None) => ComplexityTier::Critical,
        };

        let history_term_stats = match history.outcome_stats(&proposal.agent_id, action_type, None) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    proposal_id = %proposal.proposal_id,
                    agent_id = %proposal.agent_id,
                    error = %e,
                    "outcome history unavailable, scoring with worst-case history"
                );
                OutcomeStats {
                    successes: 0,
                    failures: 1,
                }
            }
        };

        Ok(Self::risk_score(complexity, maturity, history_term_stats))
    }

    /// Ranking order: highest risk first, then oldest, then by id.
    /// Unscored proposals sort after scored ones.
    pub fn compare(a: &Proposal, b: &Proposal) -> Ordering {
        let by_score = match (a.risk_score, b.risk_score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_score
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.proposal_id.cmp(&b.proposal_id))
    }

    pub fn rank(proposals: &mut [Proposal]) {
        proposals.sort_by(Self::compare);
    }

    /// Whether a human approval of this proposal may go through.
    ///
    /// Training proposals are checked against status and the risk ceiling
    /// only; permission and maturity minimums apply to actions.
    pub fn check_approval_criteria(
        &self,
        proposal: &Proposal,
        agent: &Agent,
        maturity: MaturityLevel,
        registry: &ComplexityRegistry,
    ) -> ApprovalCheck {
        let mut reasons = Vec::new();

        if !proposal.is_pending() {
            reasons.push(format!("proposal is already {}", proposal.status));
        }

        match proposal.risk_score {
            Some(score) if score > self.risk_ceiling => reasons.push(format!(
                "risk score {:.2} exceeds workspace ceiling {:.2}",
                score, self.risk_ceiling
            )),
            Some(_) => {}
            None => reasons.push("proposal has not been scored".to_string()),
        }

        if let ProposalKind::Action { action_type, .. } = &proposal.kind {
            let profile = registry.profile(action_type);
            if let Some(permission) = &profile.permission {
                if !agent.has_permission(permission) {
                    reasons.push(format!(
                        "agent {} lacks permission class '{}' for {}",
                        agent.agent_id, permission, action_type
                    ));
                }
            }
            let minimum = profile.effective_min_maturity();
            if maturity < minimum {
                reasons.push(format!(
                    "maturity {} is below the minimum {} for {}",
                    maturity, minimum, action_type
                ));
            }
        }

        ApprovalCheck {
            approvable: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gov_policy::{MemoryHistory, PolicyError};
    use serde_json::json;

    struct BrokenHistory;

    impl AgentHistory for BrokenHistory {
        fn record_outcome(&self, _: &str, _: &str, _: bool, _: chrono::DateTime<Utc>) -> Result<(), PolicyError> {
            Err(PolicyError::History("down".to_string()))
        }
        fn outcome_stats(
            &self,
            _: &str,
            _: Option<&str>,
            _: Option<chrono::DateTime<Utc>>,
        ) -> Result<OutcomeStats, PolicyError> {
            Err(PolicyError::History("down".to_string()))
        }
        fn record_intervention(&self, _: gov_policy::InterventionRecord) -> Result<(), PolicyError> {
            Err(PolicyError::History("down".to_string()))
        }
        fn resolve_intervention(&self, _: uuid::Uuid, _: chrono::DateTime<Utc>) -> Result<bool, PolicyError> {
            Err(PolicyError::History("down".to_string()))
        }
        fn interventions(
            &self,
            _: &str,
            _: chrono::DateTime<Utc>,
        ) -> Result<Vec<gov_policy::InterventionRecord>, PolicyError> {
            Err(PolicyError::History("down".to_string()))
        }
    }

    fn scored(score: f64) -> Proposal {
        let mut p = Proposal::action("agent-1", "send_email", json!({}), Duration::hours(1));
        p.risk_score = Some(score);
        p
    }

    #[test]
    fn validate_reports_every_missing_field() {
        let mut p = Proposal::action("", "  ", json!({}), Duration::hours(1));
        p.description.clear();
        match ProposalEvaluator::validate(&p) {
            Err(ProposalError::IncompleteProposal { missing, .. }) => {
                assert_eq!(missing, vec!["agent_id", "description", "action_type"]);
            }
            other => panic!("expected IncompleteProposal, got {:?}", other),
        }
    }

    #[test]
    fn incomplete_proposal_is_not_scored() {
        let p = Proposal::action("agent-1", "", json!({}), Duration::hours(1));
        let result = ProposalEvaluator::score(
            &p,
            MaturityLevel::Intern,
            &ComplexityRegistry::with_defaults(),
            &MemoryHistory::new(),
        );
        assert!(matches!(result, Err(ProposalError::IncompleteProposal { .. })));
    }

    #[test]
    fn new_agent_gets_penalized_neutral_history() {
        // 0.5*0.35 + 0.3*0.6 + 0.2*0.6
        let score = ProposalEvaluator::risk_score(
            ComplexityTier::Moderate,
            MaturityLevel::Intern,
            OutcomeStats::default(),
        );
        assert!((score - 0.475).abs() < 1e-9);
    }

    #[test]
    fn history_moves_the_score() {
        let history = MemoryHistory::new();
        let now = Utc::now();
        for _ in 0..4 {
            history.record_outcome("agent-1", "send_email", true, now).unwrap();
        }
        let p = Proposal::action("agent-1", "send_email", json!({}), Duration::hours(1));
        let registry = ComplexityRegistry::with_defaults();

        let clean = ProposalEvaluator::score(&p, MaturityLevel::Intern, &registry, &history).unwrap();
        let fresh =
            ProposalEvaluator::score(&p, MaturityLevel::Intern, &registry, &MemoryHistory::new()).unwrap();
        assert!(clean < fresh);

        let broken = ProposalEvaluator::score(&p, MaturityLevel::Intern, &registry, &BrokenHistory).unwrap();
        assert!(broken > fresh);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for tier in [ComplexityTier::Low, ComplexityTier::Critical] {
            for level in [MaturityLevel::Student, MaturityLevel::Autonomous] {
                for failures in [0, 5] {
                    let s = ProposalEvaluator::risk_score(
                        tier,
                        level,
                        OutcomeStats { successes: 1, failures },
                    );
                    assert!((0.0..=1.0).contains(&s));
                }
            }
        }
    }

    #[test]
    fn compare_orders_by_score_then_age() {
        let low = scored(0.2);
        let high = scored(0.8);
        let mut older_tie = scored(0.5);
        older_tie.created_at = Utc::now() - Duration::minutes(10);
        let newer_tie = scored(0.5);

        let mut list = vec![low.clone(), newer_tie.clone(), high.clone(), older_tie.clone()];
        ProposalEvaluator::rank(&mut list);
        let ids: Vec<_> = list.iter().map(|p| p.proposal_id).collect();
        assert_eq!(
            ids,
            vec![
                high.proposal_id,
                older_tie.proposal_id,
                newer_tie.proposal_id,
                low.proposal_id
            ]
        );
    }

    #[test]
    fn approval_criteria_reasons() {
        let evaluator = ProposalEvaluator::new(0.75);
        let registry = ComplexityRegistry::with_defaults();
        let agent = Agent::new("agent-1", "A", "ws");

        let mut p = Proposal::action("agent-1", "transfer_funds", json!({}), Duration::hours(1));
        p.risk_score = Some(0.9);
        let check = evaluator.check_approval_criteria(&p, &agent, MaturityLevel::Student, &registry);
        assert!(!check.approvable);
        assert_eq!(check.reasons.len(), 3, "{:?}", check.reasons);

        let agent = agent.with_permission("email");
        let mut ok = Proposal::action("agent-1", "send_email", json!({}), Duration::hours(1));
        ok.risk_score = Some(0.4);
        let check = evaluator.check_approval_criteria(&ok, &agent, MaturityLevel::Intern, &registry);
        assert!(check.approvable, "{:?}", check.reasons);
    }

    #[test]
    fn training_proposals_skip_action_checks() {
        let evaluator = ProposalEvaluator::new(0.75);
        let mut p = Proposal::training("agent-1", MaturityLevel::Intern, "needs practice", Duration::hours(1))
            .with_blocked_action("transfer_funds");
        p.risk_score = Some(0.5);
        let check = evaluator.check_approval_criteria(
            &p,
            &Agent::new("agent-1", "A", "ws"),
            MaturityLevel::Student,
            &ComplexityRegistry::with_defaults(),
        );
        assert!(check.approvable, "{:?}", check.reasons);
    }
}
