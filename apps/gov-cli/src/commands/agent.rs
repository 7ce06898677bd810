// agent.rs — Agent subcommands: list, show, register, bind, graduate.

use clap::Subcommand;
use gov_engine::EngineError;
use gov_policy::{Agent, MaturityLevel};

use super::{default_actor, print_json, truncate, Context};

#[derive(Subcommand)]
pub enum AgentCommands {
    /// List registered agents with their current tier.
    List,
    /// Show one agent.
    Show {
        agent_id: String,
    },
    /// Register or update an agent.
    Register {
        agent_id: String,
        /// Display name (defaults to the agent ID).
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "default")]
        workspace: String,
        /// Confidence score in [0, 1]. Omit for an unscored (STUDENT) agent.
        #[arg(long)]
        confidence: Option<f64>,
        /// Permission class granted to the agent. Repeatable.
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },
    /// Bind a caller session to an agent.
    Bind {
        session_id: String,
        agent_id: String,
    },
    /// Promote an agent to the next maturity tier.
    Graduate {
        agent_id: String,
        /// Target tier (intern, supervised, autonomous).
        #[arg(long)]
        to: MaturityLevel,
        #[arg(long)]
        by: Option<String>,
    },
}

pub async fn execute(cmd: &AgentCommands, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    match cmd {
        AgentCommands::List => {
            let mut agents = engine.agents()?;
            agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
            let rows: Vec<(Agent, MaturityLevel)> = agents
                .into_iter()
                .map(|a| {
                    let tier = engine.maturity_of(&a.agent_id)?;
                    Ok((a, tier))
                })
                .collect::<Result<_, EngineError>>()?;
            if ctx.json {
                let out: Vec<_> = rows
                    .iter()
                    .map(|(a, tier)| serde_json::json!({ "agent": a, "maturity": tier }))
                    .collect();
                return print_json(&out);
            }
            if rows.is_empty() {
                println!("No agents registered.");
                return Ok(());
            }
            println!(
                "{:<28} {:<16} {:<11} {:<10} PERMISSIONS",
                "ID", "WORKSPACE", "TIER", "CONFIDENCE"
            );
            println!("{}", "-".repeat(90));
            for (a, tier) in &rows {
                println!(
                    "{:<28} {:<16} {:<11} {:<10} {}",
                    truncate(&a.agent_id, 28),
                    truncate(&a.workspace_id, 16),
                    tier.to_string(),
                    a.confidence.map_or("-".to_string(), |c| format!("{:.2}", c)),
                    a.permissions.join(","),
                );
            }
        }

        AgentCommands::Show { agent_id } => {
            let agent = engine.agent(agent_id)?;
            let tier = engine.maturity_of(agent_id)?;
            if ctx.json {
                return print_json(&serde_json::json!({ "agent": agent, "maturity": tier }));
            }
            println!("Agent:       {}", agent.agent_id);
            println!("Name:        {}", agent.name);
            println!("Workspace:   {}", agent.workspace_id);
            println!("Tier:        {}", tier);
            println!(
                "Confidence:  {}",
                agent
                    .confidence
                    .map_or("unscored".to_string(), |c| format!("{:.3}", c))
            );
            if !agent.permissions.is_empty() {
                println!("Permissions: {}", agent.permissions.join(", "));
            }
            if agent.system_default {
                println!("(workspace system-default agent)");
            }
        }

        AgentCommands::Register {
            agent_id,
            name,
            workspace,
            confidence,
            permissions,
        } => {
            if let Some(c) = confidence {
                if !(0.0..=1.0).contains(c) {
                    anyhow::bail!("--confidence must be in [0, 1], got {}", c);
                }
            }
            let mut agent = Agent::new(
                agent_id,
                name.clone().unwrap_or_else(|| agent_id.clone()),
                workspace,
            );
            match engine.agent(agent_id) {
                Ok(existing) => agent.created_at = existing.created_at,
                Err(EngineError::AgentNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            agent.confidence = *confidence;
            for p in permissions {
                agent = agent.with_permission(p);
            }
            engine.register_agent(agent)?;
            println!("Registered agent {} ({})", agent_id, engine.maturity_of(agent_id)?);
        }

        AgentCommands::Bind {
            session_id,
            agent_id,
        } => {
            engine.set_session_agent(session_id, agent_id)?;
            println!("Session {} now acts as {}", session_id, agent_id);
        }

        AgentCommands::Graduate { agent_id, to, by } => {
            let by = by.clone().unwrap_or_else(default_actor);
            match engine.graduate(agent_id, *to, &by).await {
                Ok(agent) => {
                    if ctx.json {
                        return print_json(&agent);
                    }
                    println!("Graduated {} to {}", agent_id, to);
                }
                Err(EngineError::NotEligible { reasons, .. }) => {
                    println!("{} is not eligible for {}:", agent_id, to);
                    for r in &reasons {
                        println!("  - {}", r);
                    }
                    anyhow::bail!("graduation refused");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}
