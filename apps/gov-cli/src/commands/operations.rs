// operations.rs — What an agent has in progress.

use gov_engine::Operation;

use super::{print_json, truncate, Context};

pub fn execute(agent_id: &str, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let ops = engine.get_active_operations(agent_id)?;
    if ctx.json {
        return print_json(&ops);
    }
    if ops.is_empty() {
        println!("No active operations for {}.", agent_id);
        return Ok(());
    }

    println!("{:<10} {:<38} {:<18} DETAIL", "TYPE", "ID", "STATE");
    println!("{}", "-".repeat(100));
    for op in &ops {
        match op {
            Operation::Execution(e) => println!(
                "{:<10} {:<38} {:<18} {} (attempt {})",
                "execution",
                e.handle.execution_id,
                "running",
                e.handle.action_type,
                e.attempt
            ),
            Operation::Proposal(p) => println!(
                "{:<10} {:<38} {:<18} {}",
                "proposal",
                p.proposal_id,
                format!(
                    "pending risk={}",
                    p.risk_score.map_or("-".to_string(), |s| format!("{:.2}", s))
                ),
                truncate(&p.description, 40)
            ),
            Operation::Session(s) => println!(
                "{:<10} {:<38} {:<18} {}",
                "session", s.session_id, s.state.to_string(), s.action_type
            ),
        }
    }
    Ok(())
}
