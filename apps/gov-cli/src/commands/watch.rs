// watch.rs — Expiry sweep, once (`gov sweep`) or continuously (`gov watch`).

use gov_engine::{ConfigWatcher, Sweeper};
use tokio_util::sync::CancellationToken;

use super::{print_json, Context};

pub async fn sweep(ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let report = engine.sweep_expired().await?;
    if ctx.json {
        return print_json(&report);
    }
    if report.is_empty() {
        println!("Nothing overdue.");
        return Ok(());
    }
    for p in &report.expired_proposals {
        println!("Expired proposal {} ({})", p.proposal_id, p.agent_id);
    }
    for s in &report.expired_sessions {
        println!("Terminated session {} ({})", s.session_id, s.agent_id);
    }
    Ok(())
}

/// Run the sweeper and the config watcher until Ctrl-C.
pub async fn execute(ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let cancel = CancellationToken::new();

    let sweeper = Sweeper::new(engine.clone()).spawn(cancel.child_token());
    let watcher = ConfigWatcher::start(engine.clone(), &ctx.paths, cancel.child_token())?;
    tracing::info!(
        gov_dir = %ctx.paths.gov_dir.display(),
        sweep_interval_secs = engine.config().config.proposals.sweep_interval_secs,
        "watching for expiry and config changes"
    );
    eprintln!("Watching {} (Ctrl-C to stop)", ctx.paths.gov_dir.display());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    cancel.cancel();
    watcher.stop().await;
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "sweeper task failed");
    }
    Ok(())
}
