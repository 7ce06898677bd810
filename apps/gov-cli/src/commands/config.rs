// config.rs — Config subcommands: init, show.

use clap::Subcommand;
use gov_engine::EngineConfig;
use gov_policy::RuleSet;

use super::{print_json, Context};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default governance.toml and an empty constitution.yaml.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration and constitutional rules.
    Show,
}

pub fn execute(cmd: &ConfigCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            let paths = &ctx.paths;
            std::fs::create_dir_all(&paths.gov_dir)?;

            if paths.config.exists() && !force {
                println!(
                    "{} already exists (use --force to overwrite)",
                    paths.config.display()
                );
            } else {
                EngineConfig::default().save(&paths.config)?;
                println!("Wrote {}", paths.config.display());
            }

            if paths.constitution.exists() && !force {
                println!(
                    "{} already exists (use --force to overwrite)",
                    paths.constitution.display()
                );
            } else {
                RuleSet::default().save(&paths.constitution)?;
                println!("Wrote {}", paths.constitution.display());
            }
        }

        ConfigCommands::Show => {
            let config = EngineConfig::load_or_default(&ctx.paths.config)?;
            let rules = RuleSet::load_or_default(&ctx.paths.constitution)?;
            if ctx.json {
                return print_json(&serde_json::json!({
                    "config": config,
                    "constitution": rules,
                }));
            }
            println!("# {}", ctx.paths.config.display());
            println!("{}", toml::to_string_pretty(&config)?);
            println!("# {}", ctx.paths.constitution.display());
            if rules.rules.is_empty() {
                println!("(no constitutional rules)");
            }
            for rule in &rules.rules {
                println!("- {} [{:?}] {}", rule.rule_id, rule.enforcement, rule.description);
            }
        }
    }
    Ok(())
}
