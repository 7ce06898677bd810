// audit.rs — Audit subcommands: verify, tail.

use std::path::PathBuf;

use clap::Subcommand;
use gov_audit::{AuditError, AuditLog};

use super::{print_json, truncate, Context};

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain integrity.
    Verify {
        /// Path to audit log (defaults to .gov/audit.jsonl).
        #[arg(long)]
        log: Option<String>,
    },
    /// Show recent audit records.
    Tail {
        /// Path to audit log (defaults to .gov/audit.jsonl).
        #[arg(long)]
        log: Option<String>,
        /// Number of records to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = log_path(log, ctx);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            match AuditLog::verify_chain(&path) {
                Ok(count) => {
                    if ctx.json {
                        return print_json(&serde_json::json!({
                            "path": path,
                            "records": count,
                            "intact": true,
                        }));
                    }
                    println!(
                        "Audit log verified: {} record(s), hash chain intact.",
                        count
                    );
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    println!();
                    println!("The audit log may have been tampered with.");
                    anyhow::bail!("audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n } => {
            let path = log_path(log, ctx);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let records = AuditLog::read_all(&path)?;
            let start = records.len().saturating_sub(*n);
            let recent = &records[start..];

            if ctx.json {
                return print_json(&recent);
            }
            if recent.is_empty() {
                println!("No audit records.");
                return Ok(());
            }

            println!(
                "{:<20} {:<16} {:<20} {:<38} OUTCOME",
                "TIMESTAMP", "ACTOR", "ACTION", "SUBJECT"
            );
            println!("{}", "-".repeat(120));
            for r in recent {
                println!(
                    "{:<20} {:<16} {:<20} {:<38} {}{}",
                    r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    truncate(&r.actor, 16),
                    r.action.to_string(),
                    r.subject.as_deref().unwrap_or("-"),
                    r.outcome,
                    if r.retry_count > 0 {
                        format!(" (retried {}x)", r.retry_count)
                    } else {
                        String::new()
                    },
                );
            }
        }
    }

    Ok(())
}

fn log_path(log: &Option<String>, ctx: &Context) -> PathBuf {
    log.as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.paths.audit_log.clone())
}
