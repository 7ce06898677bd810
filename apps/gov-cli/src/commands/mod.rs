pub mod agent;
pub mod audit;
pub mod config;
pub mod operations;
pub mod proposal;
pub mod session;
pub mod trigger;
pub mod watch;

use anyhow::Context as _;
use gov_engine::{EngineBuilder, GovPaths, GovernanceEngine};
use serde::Serialize;

/// Shared state for every command.
pub struct Context {
    pub paths: GovPaths,
    pub json: bool,
}

impl Context {
    /// Open the engine on the project's `.gov/` directory.
    pub fn engine(&self) -> anyhow::Result<GovernanceEngine> {
        let builder = EngineBuilder::for_project(&self.paths).with_context(|| {
            format!(
                "failed to open governance state in {}",
                self.paths.gov_dir.display()
            )
        })?;
        Ok(builder.build()?)
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Default identity for human actions: $USER, or "cli".
pub fn default_actor() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cli".to_string())
}

pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
