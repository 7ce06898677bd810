// session.rs — Supervision session subcommands.
//
// A supervised execution runs inside the process that submitted the
// trigger. From a separate `gov` invocation these commands change the
// session record and the audit trail; cancellation of the running
// execution happens in the process that owns it.

use clap::Subcommand;
use gov_supervision::{Correction, SupervisionSession};
use uuid::Uuid;

use super::{default_actor, print_json, truncate, Context};

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List supervision sessions.
    List {
        /// Include completed and terminated sessions.
        #[arg(long)]
        all: bool,
    },
    /// Show one session with its intervention log.
    Show {
        /// Session ID.
        id: Uuid,
    },
    /// Pause a session.
    Pause {
        id: Uuid,
        #[arg(long)]
        by: Option<String>,
    },
    /// Record a correction on a session.
    Intervene {
        id: Uuid,
        /// What was corrected.
        #[arg(long)]
        note: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Resume a paused or corrected session.
    Resume {
        id: Uuid,
        #[arg(long)]
        by: Option<String>,
    },
    /// End a session and cancel its execution.
    Terminate {
        id: Uuid,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        by: Option<String>,
    },
}

pub async fn execute(cmd: &SessionCommands, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let session = match cmd {
        SessionCommands::List { all } => {
            let mut sessions: Vec<SupervisionSession> = engine
                .sessions()?
                .into_iter()
                .filter(|s| *all || !s.state.is_terminal())
                .collect();
            sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            if ctx.json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("No supervision sessions.");
                return Ok(());
            }
            println!(
                "{:<38} {:<18} {:<16} {:<11} {:<5} STARTED",
                "ID", "AGENT", "ACTION", "STATE", "FIXES"
            );
            println!("{}", "-".repeat(110));
            for s in &sessions {
                println!(
                    "{:<38} {:<18} {:<16} {:<11} {:<5} {}",
                    s.session_id,
                    truncate(&s.agent_id, 18),
                    truncate(&s.action_type, 16),
                    s.state.to_string(),
                    s.interventions.len(),
                    s.started_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            return Ok(());
        }
        SessionCommands::Show { id } => engine.session(*id)?,
        SessionCommands::Pause { id, by } => {
            let by = by.clone().unwrap_or_else(default_actor);
            engine.pause_session(*id, &by).await?
        }
        SessionCommands::Intervene { id, note, by } => {
            let by = by.clone().unwrap_or_else(default_actor);
            engine.intervene(*id, Correction::new(by, note)).await?
        }
        SessionCommands::Resume { id, by } => {
            let by = by.clone().unwrap_or_else(default_actor);
            engine.resume_session(*id, &by).await?
        }
        SessionCommands::Terminate { id, reason, by } => {
            let by = by.clone().unwrap_or_else(default_actor);
            engine.terminate_session(*id, &by, reason).await?
        }
    };

    if ctx.json {
        return print_json(&session);
    }
    print_session(&session);
    Ok(())
}

fn print_session(s: &SupervisionSession) {
    println!("Session:  {}", s.session_id);
    println!("Agent:    {} ({})", s.agent_id, s.maturity);
    println!("Action:   {}", s.action_type);
    println!("Trigger:  {}", s.trigger_id);
    println!("State:    {}", s.state);
    println!("Expires:  {}", s.expires_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(by) = &s.ended_by {
        println!(
            "Ended by: {}{}",
            by,
            s.end_reason
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        );
    }
    if !s.interventions.is_empty() {
        println!();
        println!("Interventions:");
        for i in &s.interventions {
            println!(
                "  {} {:<12} {}{}",
                i.at.format("%Y-%m-%d %H:%M:%S"),
                i.by,
                i.description,
                if i.resolved_at.is_some() { "" } else { " [open]" }
            );
        }
    }
}
