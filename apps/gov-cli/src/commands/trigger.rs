// trigger.rs — Trigger subcommands: submit.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use gov_engine::{EngineError, RoutingDecision, SubmitOutcome, Trigger, TriggerOrigin};
use serde_json::Value;

use super::{print_json, Context};

#[derive(Subcommand)]
pub enum TriggerCommands {
    /// Route one action through governance.
    Submit {
        /// Action type (e.g. send_email, deploy).
        #[arg(required_unless_present = "file")]
        action_type: Option<String>,
        /// Read the whole trigger from a JSON file instead of flags.
        /// Re-submitting the same file replays its trigger ID.
        #[arg(long, conflicts_with_all = ["agent", "session", "payload", "manual"])]
        file: Option<PathBuf>,
        /// Agent to act as. Defaults to the session binding, then the workspace default.
        #[arg(long)]
        agent: Option<String>,
        /// Caller session for session-bound agent resolution.
        #[arg(long)]
        session: Option<String>,
        #[arg(long, default_value = "default")]
        workspace: String,
        /// Action parameters as a JSON object.
        #[arg(long)]
        payload: Option<String>,
        /// Submitted by a human (MANUAL) rather than by automation.
        #[arg(long)]
        manual: bool,
        /// For SUPERVISE decisions, stay attached until the execution finishes.
        #[arg(long)]
        wait: bool,
    },
}

pub async fn execute(cmd: &TriggerCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        TriggerCommands::Submit {
            action_type,
            file,
            agent,
            session,
            workspace,
            payload,
            manual,
            wait,
        } => {
            let trigger = match (file, action_type) {
                (Some(path), _) => read_trigger(path)?,
                (None, Some(action_type)) => {
                    let origin = if *manual {
                        TriggerOrigin::Manual
                    } else {
                        TriggerOrigin::Automated
                    };
                    let mut trigger = Trigger::new(origin, action_type, workspace);
                    if let Some(agent) = agent {
                        trigger = trigger.with_agent(agent);
                    }
                    if let Some(session) = session {
                        trigger = trigger.with_session(session);
                    }
                    if let Some(raw) = payload {
                        trigger = trigger.with_payload(parse_payload(raw)?);
                    }
                    trigger
                }
                (None, None) => anyhow::bail!("an action type or --file is required"),
            };

            let engine = ctx.engine()?;
            let outcome = match engine.submit_trigger(trigger.clone()).await {
                Ok(outcome) => outcome,
                Err(EngineError::AuditWriteFailed {
                    reason, decision, ..
                }) => {
                    if let Some(d) = decision {
                        eprintln!("Decision stored but NOT audited: {}", d.summary());
                    }
                    eprintln!("Save this trigger and re-submit it with --file to retry:");
                    eprintln!("{}", serde_json::to_string(&trigger)?);
                    anyhow::bail!("audit write failed: {}", reason);
                }
                Err(e) => return Err(e.into()),
            };

            if *wait && outcome.decision.decision == RoutingDecision::Supervise {
                if let Some(session_id) = outcome.decision.session_id {
                    eprintln!("Supervising session {}; waiting for the execution...", session_id);
                    engine.wait_supervised(session_id).await;
                }
            }

            if ctx.json {
                return print_json(&outcome);
            }
            print_outcome(&outcome);
        }
    }
    Ok(())
}

fn read_trigger(path: &Path) -> anyhow::Result<Trigger> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&data)
        .map_err(|e| anyhow::anyhow!("{} is not a valid trigger: {}", path.display(), e))
}

fn parse_payload(raw: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--payload is not valid JSON: {}", e))?;
    if !value.is_object() && !value.is_null() {
        anyhow::bail!("--payload must be a JSON object");
    }
    Ok(value)
}

fn print_outcome(outcome: &SubmitOutcome) {
    let d = &outcome.decision;
    println!("Trigger:    {}", d.trigger_id);
    println!("Agent:      {} ({})", d.agent_id, d.maturity);
    println!("Action:     {} ({})", d.action_type, d.complexity);
    println!("Decision:   {}", d.decision);
    if outcome.replayed {
        println!("            (already decided; nothing re-routed)");
    }
    if let Some(v) = &d.violation {
        println!("Violation:  {}: {}", v.rule_id, v.reason);
    }
    for w in &d.warnings {
        println!("Warning:    {}: {}", w.rule_id, w.reason);
    }
    if let Some(id) = d.proposal_id {
        println!("Proposal:   {}", id);
    }
    if let Some(id) = d.session_id {
        println!("Session:    {}", id);
    }
    if let Some(report) = &outcome.execution {
        println!(
            "Executed:   {} attempt(s), execution {}",
            report.attempts, report.execution_id
        );
    }
    println!();
    println!("Trace:");
    for step in &d.trace {
        println!("  {:<18} {}", step.check, step.outcome);
    }
}
