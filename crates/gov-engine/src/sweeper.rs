// sweeper.rs — Background expiry sweep.
//
// Runs `sweep_expired` on the configured interval until cancelled. The
// interval is re-read from the live configuration before every sleep, so a
// reload takes effect on the next tick.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::GovernanceEngine;

pub struct Sweeper {
    engine: GovernanceEngine,
}

impl Sweeper {
    pub fn new(engine: GovernanceEngine) -> Self {
        Self { engine }
    }

    /// Sweep until `cancel` fires. A failed sweep is logged and retried on
    /// the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let interval = self.engine.config().config.sweep_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.engine.sweep_expired().await {
                Ok(report) if !report.is_empty() => tracing::info!(
                    proposals = report.expired_proposals.len(),
                    sessions = report.expired_sessions.len(),
                    "expired stale work"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }
        tracing::debug!("expiry sweeper stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gov_policy::Agent;
    use gov_proposal::{Proposal, ProposalStatus};
    use gov_store::{MemoryStore, RecordStore};
    use std::sync::Arc;

    use crate::config::EngineConfig;

    #[tokio::test]
    async fn sweeper_expires_and_stops_on_cancel() {
        let proposals = Arc::new(MemoryStore::<Proposal>::new());
        let mut config = EngineConfig::default();
        config.proposals.sweep_interval_secs = 1;
        let engine = GovernanceEngine::builder()
            .config(config)
            .proposal_store(proposals.clone())
            .build()
            .unwrap();
        engine
            .register_agent(Agent::new("a", "A", "ws").with_confidence(0.55))
            .unwrap();
        let stale = Proposal::action("a", "send_email", serde_json::Value::Null, Duration::seconds(-5));
        proposals.save(&stale).unwrap();

        let cancel = CancellationToken::new();
        let handle = Sweeper::new(engine.clone()).spawn(cancel.clone());
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        cancel.cancel();
        handle.await.unwrap();

        let swept = engine.proposal(stale.proposal_id).unwrap();
        assert_eq!(swept.status, ProposalStatus::Expired);
    }
}
