//! # gov-cli
//!
//! Command-line interface for the governance engine.
//!
//! Every command opens the engine on the project's `.gov/` directory:
//! - `gov trigger submit` — route an action through governance
//! - `gov proposal list/show/approve/reject` — resolve deferred work
//! - `gov session list/show/pause/intervene/resume/terminate` — supervise
//! - `gov agent list/show/register/bind/graduate` — manage agents and tiers
//! - `gov operations <agent>` — everything an agent has in progress
//! - `gov audit verify/tail` — inspect the tamper-evident audit trail
//! - `gov config init/show` — the project's governance configuration
//! - `gov sweep` / `gov watch` — expire stale work, once or continuously

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gov_engine::GovPaths;
use tracing_subscriber::EnvFilter;

/// Agent governance: route, review, and supervise agent actions.
#[derive(Parser)]
#[command(name = "gov", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    /// Print results as JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit triggers for routing.
    Trigger {
        #[command(subcommand)]
        command: commands::trigger::TriggerCommands,
    },
    /// Review and resolve proposals.
    Proposal {
        #[command(subcommand)]
        command: commands::proposal::ProposalCommands,
    },
    /// Control supervision sessions.
    Session {
        #[command(subcommand)]
        command: commands::session::SessionCommands,
    },
    /// Manage agents and their maturity.
    Agent {
        #[command(subcommand)]
        command: commands::agent::AgentCommands,
    },
    /// List an agent's in-flight executions, pending proposals, and live sessions.
    Operations {
        /// Agent ID.
        agent_id: String,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Inspect or initialize governance configuration.
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
    /// Expire overdue proposals and supervision sessions once.
    Sweep,
    /// Run the expiry sweeper and config hot-reload until interrupted.
    Watch,
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with command output.
    let filter = EnvFilter::from_default_env()
        .add_directive("gov_engine=info".parse()?)
        .add_directive("gov_cli=info".parse()?);
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs)?;

    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let ctx = commands::Context {
        paths: GovPaths::for_project(&project_root),
        json: cli.json,
    };

    match &cli.command {
        Commands::Trigger { command } => commands::trigger::execute(command, &ctx).await,
        Commands::Proposal { command } => commands::proposal::execute(command, &ctx).await,
        Commands::Session { command } => commands::session::execute(command, &ctx).await,
        Commands::Agent { command } => commands::agent::execute(command, &ctx).await,
        Commands::Operations { agent_id } => commands::operations::execute(agent_id, &ctx),
        Commands::Audit { command } => commands::audit::execute(command, &ctx),
        Commands::Config { command } => commands::config::execute(command, &ctx),
        Commands::Sweep => commands::watch::sweep(&ctx).await,
        Commands::Watch => commands::watch::execute(&ctx).await,
    }
}
