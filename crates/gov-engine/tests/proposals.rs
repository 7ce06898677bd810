// proposals.rs — Human resolution of proposals and the expiry sweep.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{fast_config, Harness, RecordingExecutor};
use gov_audit::{AuditAction, MemoryAuditSink};
use gov_engine::{EngineError, GovernanceEngine, Operation, RoutingDecision, Trigger};
use gov_policy::{Agent, ConstitutionalRule, Constraint, EnforcementMode, RuleSet};
use gov_proposal::{Proposal, ProposalStatus};
use gov_store::{MemoryStore, RecordStore};
use gov_supervision::{SessionState, SupervisionSession};
use serde_json::json;
use uuid::Uuid;

async fn intern_email_proposal(h: &Harness, with_permission: bool) -> Uuid {
    let mut agent = Agent::new("intern", "Intern", "ws").with_confidence(0.55);
    if with_permission {
        agent = agent.with_permission("email");
    }
    h.agent_with(agent);
    let outcome = h
        .engine
        .submit_trigger(
            Trigger::automated("send_email", "ws")
                .with_agent("intern")
                .with_payload(json!({ "to": "ops@example.com" })),
        )
        .await
        .unwrap();
    assert_eq!(outcome.decision.decision, RoutingDecision::CreateProposal);
    outcome.decision.proposal_id.unwrap()
}

#[tokio::test]
async fn approved_action_proposal_executes() {
    let h = Harness::new();
    let proposal_id = intern_email_proposal(&h, true).await;

    let outcome = h.engine.approve_proposal(proposal_id, "alice").await.unwrap();
    assert_eq!(outcome.proposal.status, ProposalStatus::Approved);
    assert!(outcome.execution.is_some());

    let calls = h.executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].proposal_id, Some(proposal_id));
    assert_eq!(calls[0].payload, json!({ "to": "ops@example.com" }));

    let approved = h
        .audit
        .records()
        .into_iter()
        .find(|r| r.action == AuditAction::ProposalApproved)
        .unwrap();
    assert_eq!(approved.actor, "alice");
    assert_eq!(approved.subject, Some(proposal_id.to_string()));
}

#[tokio::test]
async fn approval_cannot_override_a_constitutional_violation() {
    let rules = RuleSet::new(vec![ConstitutionalRule {
        rule_id: "no-drops".to_string(),
        description: "agents never drop tables".to_string(),
        constraint: Constraint::ForbiddenAction {
            patterns: vec!["drop_*".to_string()],
        },
        enforcement: EnforcementMode::Error,
    }]);
    let h = Harness::with(fast_config(), rules, RecordingExecutor::default());
    h.agent_with(
        Agent::new("dba", "DBA", "ws")
            .with_confidence(0.95)
            .with_permission("data_admin"),
    );

    let outcome = h
        .engine
        .submit_trigger(Trigger::automated("drop_table", "ws").with_agent("dba"))
        .await
        .unwrap();
    assert_eq!(outcome.decision.decision, RoutingDecision::CreateProposal);
    let proposal_id = outcome.decision.proposal_id.unwrap();
    let audit_count = h.audit.len();

    let err = h.engine.approve_proposal(proposal_id, "alice").await.unwrap_err();
    match err {
        EngineError::NotApprovable { reasons, .. } => {
            assert!(reasons.iter().any(|r| r.contains("no-drops")));
        }
        other => panic!("expected NotApprovable, got {:?}", other),
    }
    assert!(h.executor.calls().is_empty());
    assert_eq!(
        h.engine.proposal(proposal_id).unwrap().status,
        ProposalStatus::Pending
    );
    assert_eq!(h.audit.len(), audit_count);
}

#[tokio::test]
async fn approval_requires_permission_class() {
    let h = Harness::new();
    let proposal_id = intern_email_proposal(&h, false).await;

    let err = h.engine.approve_proposal(proposal_id, "alice").await.unwrap_err();
    match err {
        EngineError::NotApprovable { reasons, .. } => {
            assert!(reasons.iter().any(|r| r.contains("email")));
        }
        other => panic!("expected NotApprovable, got {:?}", other),
    }
    assert_eq!(
        h.engine.proposal(proposal_id).unwrap().status,
        ProposalStatus::Pending
    );
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn risky_training_proposal_is_not_approvable() {
    let h = Harness::new();
    h.agent("novice", 0.1);
    let outcome = h
        .engine
        .submit_trigger(Trigger::automated("drop_table", "ws").with_agent("novice"))
        .await
        .unwrap();
    let proposal_id = outcome.decision.proposal_id.unwrap();
    let proposal = h.engine.proposal(proposal_id).unwrap();
    assert!(proposal.risk_score.unwrap() > 0.75);

    let err = h.engine.approve_proposal(proposal_id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::NotApprovable { .. }));
}

#[tokio::test]
async fn approved_training_proposal_runs_nothing() {
    let h = Harness::new();
    h.agent("novice", 0.35);
    let outcome = h
        .engine
        .submit_trigger(Trigger::automated("send_email", "ws").with_agent("novice"))
        .await
        .unwrap();

    let approval = h
        .engine
        .approve_proposal(outcome.decision.proposal_id.unwrap(), "coach")
        .await
        .unwrap();
    assert_eq!(approval.proposal.status, ProposalStatus::Approved);
    assert!(approval.execution.is_none());
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn proposals_resolve_exactly_once() {
    let h = Harness::new();
    let proposal_id = intern_email_proposal(&h, true).await;

    let rejected = h
        .engine
        .reject_proposal(proposal_id, "bob", "not this week")
        .await
        .unwrap();
    assert_eq!(rejected.status, ProposalStatus::Rejected);

    let err = h.engine.approve_proposal(proposal_id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    let err = h
        .engine
        .reject_proposal(proposal_id, "bob", "twice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn unknown_proposal_is_not_found() {
    let h = Harness::new();
    let missing = Uuid::new_v4();
    let err = h.engine.approve_proposal(missing, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::ProposalNotFound(id) if id == missing));
}

#[tokio::test]
async fn approval_audit_failure_is_escalated_without_execution() {
    let h = Harness::new();
    let proposal_id = intern_email_proposal(&h, true).await;
    h.audit.fail_next(4);

    let err = h.engine.approve_proposal(proposal_id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::AuditWriteFailed { .. }));
    // The approval itself stands.
    assert_eq!(
        h.engine.proposal(proposal_id).unwrap().status,
        ProposalStatus::Approved
    );
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn overdue_proposal_cannot_be_approved_and_is_swept() {
    let h = Harness::new();
    h.agent_with(
        Agent::new("intern", "Intern", "ws")
            .with_confidence(0.55)
            .with_permission("email"),
    );
    let mut stale = Proposal::action("intern", "send_email", json!({}), Duration::seconds(-10));
    stale.risk_score = Some(0.4);
    h.proposals.save(&stale).unwrap();

    let err = h
        .engine
        .approve_proposal(stale.proposal_id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotApprovable { .. }));

    let report = h.engine.sweep_expired().await.unwrap();
    assert_eq!(report.expired_proposals.len(), 1);
    assert_eq!(
        h.engine.proposal(stale.proposal_id).unwrap().status,
        ProposalStatus::Expired
    );
    assert!(h
        .audit
        .records()
        .iter()
        .any(|r| r.action == AuditAction::ProposalExpired));

    let again = h.engine.sweep_expired().await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn sweep_terminates_overdue_sessions() {
    let sessions = Arc::new(MemoryStore::<SupervisionSession>::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = GovernanceEngine::builder()
        .config(fast_config())
        .session_store(sessions.clone())
        .audit_sink(audit.clone())
        .executor(Arc::new(RecordingExecutor::new(common::Behavior::Gated)))
        .build()
        .unwrap();
    engine
        .register_agent(Agent::new("ops", "Ops", "ws").with_confidence(0.72))
        .unwrap();
    let outcome = engine
        .submit_trigger(Trigger::automated("deploy", "ws").with_agent("ops"))
        .await
        .unwrap();
    let session_id = outcome.decision.session_id.unwrap();

    let mut session = sessions.get(&session_id.to_string()).unwrap().unwrap();
    session.expires_at = Utc::now() - Duration::minutes(1);
    sessions.save(&session).unwrap();

    let report = engine.sweep_expired().await.unwrap();
    assert_eq!(report.expired_sessions.len(), 1);
    assert_eq!(
        engine.session(session_id).unwrap().state,
        SessionState::Terminated
    );
    // Terminating the session cancels the execution bound to it.
    engine.wait_supervised(session_id).await;
    assert!(audit
        .records()
        .iter()
        .any(|r| r.action == AuditAction::ExecutionOutcome && r.outcome == "cancelled"));
}

#[tokio::test]
async fn active_operations_list_pending_work_for_one_agent() {
    let h = Harness::with(
        fast_config(),
        RuleSet::default(),
        RecordingExecutor::new(common::Behavior::Gated),
    );
    h.agent("a", 0.55);
    h.agent("b", 0.72);

    let low = h
        .engine
        .submit_trigger(Trigger::automated("read_data", "ws").with_agent("a"))
        .await
        .unwrap();
    let high = h
        .engine
        .submit_trigger(Trigger::automated("delete_record", "ws").with_agent("a"))
        .await
        .unwrap();
    let supervised = h
        .engine
        .submit_trigger(Trigger::automated("deploy", "ws").with_agent("b"))
        .await
        .unwrap();

    let ops_a = h.engine.get_active_operations("a").unwrap();
    let ids: Vec<Uuid> = ops_a
        .iter()
        .map(|op| match op {
            Operation::Proposal(p) => p.proposal_id,
            other => panic!("agent a has only proposals, got {:?}", other),
        })
        .collect();
    // Highest risk first.
    assert_eq!(
        ids,
        vec![
            high.decision.proposal_id.unwrap(),
            low.decision.proposal_id.unwrap()
        ]
    );

    h.executor.started.notified().await;
    let ops_b = h.engine.get_active_operations("b").unwrap();
    assert_eq!(ops_b.len(), 2);
    assert!(matches!(&ops_b[0], Operation::Execution(e) if e.handle.agent_id == "b"));
    assert!(matches!(&ops_b[1], Operation::Session(s)
        if Some(s.session_id) == supervised.decision.session_id));

    let session_id = supervised.decision.session_id.unwrap();
    h.executor.release.notify_one();
    h.engine.wait_supervised(session_id).await;
    assert!(h.engine.get_active_operations("b").unwrap().is_empty());
}
