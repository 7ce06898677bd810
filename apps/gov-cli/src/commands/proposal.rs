// proposal.rs — Proposal subcommands: list, show, approve, reject.

use clap::Subcommand;
use gov_proposal::{Proposal, ProposalKind, ProposalStatus};
use uuid::Uuid;

use super::{default_actor, print_json, truncate, Context};

#[derive(Subcommand)]
pub enum ProposalCommands {
    /// List proposals, riskiest first.
    List {
        /// Filter by status (pending, approved, rejected, expired).
        #[arg(long)]
        status: Option<String>,
        /// Filter by agent ID.
        #[arg(long)]
        agent: Option<String>,
    },
    /// Show one proposal.
    Show {
        /// Proposal ID.
        id: Uuid,
    },
    /// Approve a pending proposal. Approved actions run immediately.
    Approve {
        /// Proposal ID.
        id: Uuid,
        /// Approver identity (defaults to $USER).
        #[arg(long)]
        by: Option<String>,
    },
    /// Reject a pending proposal.
    Reject {
        /// Proposal ID.
        id: Uuid,
        /// Reason for rejection.
        #[arg(long)]
        reason: String,
        /// Approver identity (defaults to $USER).
        #[arg(long)]
        by: Option<String>,
    },
}

pub async fn execute(cmd: &ProposalCommands, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    match cmd {
        ProposalCommands::List { status, agent } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let proposals: Vec<Proposal> = engine
                .proposals(status)?
                .into_iter()
                .filter(|p| agent.as_deref().map_or(true, |a| p.agent_id == a))
                .collect();
            if ctx.json {
                return print_json(&proposals);
            }
            if proposals.is_empty() {
                println!("No proposals.");
                return Ok(());
            }
            println!(
                "{:<38} {:<9} {:<18} {:<6} {:<9} DESCRIPTION",
                "ID", "KIND", "AGENT", "RISK", "STATUS"
            );
            println!("{}", "-".repeat(110));
            for p in &proposals {
                println!(
                    "{:<38} {:<9} {:<18} {:<6} {:<9} {}",
                    p.proposal_id,
                    p.kind.label(),
                    truncate(&p.agent_id, 18),
                    p.risk_score.map_or("-".to_string(), |s| format!("{:.2}", s)),
                    p.status.to_string(),
                    truncate(&p.description, 40),
                );
            }
        }

        ProposalCommands::Show { id } => {
            let p = engine.proposal(*id)?;
            if ctx.json {
                return print_json(&p);
            }
            print_proposal(&p);
        }

        ProposalCommands::Approve { id, by } => {
            let by = by.clone().unwrap_or_else(default_actor);
            let outcome = engine.approve_proposal(*id, &by).await?;
            if ctx.json {
                return print_json(&outcome);
            }
            println!("Approved proposal {} by {}", id, by);
            if let Some(report) = &outcome.execution {
                println!(
                    "Executed in {} attempt(s), execution {}",
                    report.attempts, report.execution_id
                );
            }
        }

        ProposalCommands::Reject { id, reason, by } => {
            let by = by.clone().unwrap_or_else(default_actor);
            let p = engine.reject_proposal(*id, &by, reason).await?;
            if ctx.json {
                return print_json(&p);
            }
            println!("Rejected proposal {} by {}: {}", id, by, reason);
        }
    }
    Ok(())
}

fn parse_status(s: &str) -> anyhow::Result<ProposalStatus> {
    match s.to_ascii_lowercase().as_str() {
        "pending" => Ok(ProposalStatus::Pending),
        "approved" => Ok(ProposalStatus::Approved),
        "rejected" => Ok(ProposalStatus::Rejected),
        "expired" => Ok(ProposalStatus::Expired),
        other => anyhow::bail!(
            "unknown status '{}' (expected pending, approved, rejected, expired)",
            other
        ),
    }
}

fn print_proposal(p: &Proposal) {
    println!("Proposal:    {}", p.proposal_id);
    println!("Kind:        {}", p.kind.label());
    println!("Agent:       {}", p.agent_id);
    println!("Status:      {}", p.status);
    println!("Description: {}", p.description);
    if let Some(score) = p.risk_score {
        println!("Risk score:  {:.2}", score);
    }
    if let Some(c) = p.confidence {
        println!("Confidence:  {:.2}", c);
    }
    if let Some(t) = p.trigger_id {
        println!("Trigger:     {}", t);
    }
    match &p.kind {
        ProposalKind::Training {
            target_maturity,
            blocked_action,
            reason,
        } => {
            println!("Target tier: {}", target_maturity);
            if let Some(a) = blocked_action {
                println!("Blocked:     {}", a);
            }
            println!("Reason:      {}", reason);
        }
        ProposalKind::Action {
            action_type,
            payload,
        } => {
            println!("Action:      {}", action_type);
            println!("Payload:     {}", payload);
        }
    }
    println!("Created:     {}", p.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Expires:     {}", p.expires_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(r) = &p.resolution {
        println!("Resolved by: {} at {}", r.by, r.at.format("%Y-%m-%d %H:%M:%S"));
        if let Some(reason) = &r.reason {
            println!("             {}", reason);
        }
    }
}
