// sweep.rs — Background expiry of pending proposals.

use chrono::{DateTime, Utc};
use gov_store::RecordStore;

use crate::error::ProposalError;
use crate::proposal::Proposal;

/// Expire every pending proposal whose window has elapsed at `now`.
///
/// Returns the proposals that were expired by this call. A proposal that
/// fails to save is logged and left pending for the next sweep.
pub fn expire_pending(
    store: &dyn RecordStore<Proposal>,
    now: DateTime<Utc>,
) -> Result<Vec<Proposal>, ProposalError> {
    let mut expired = Vec::new();
    for mut proposal in store.list()? {
        if !proposal.is_pending() || !proposal.is_past_expiry(now) {
            continue;
        }
        proposal.expire(now)?;
        match store.save(&proposal) {
            Ok(()) => {
                tracing::info!(
                    proposal_id = %proposal.proposal_id,
                    agent_id = %proposal.agent_id,
                    "proposal expired"
                );
                expired.push(proposal);
            }
            Err(e) => tracing::warn!(
                proposal_id = %proposal.proposal_id,
                error = %e,
                "failed to persist expired proposal"
            ),
        }
    }
    Ok(expired)
}

/// Pending proposals, optionally limited to one agent.
pub fn pending(
    store: &dyn RecordStore<Proposal>,
    agent_id: Option<&str>,
) -> Result<Vec<Proposal>, ProposalError> {
    Ok(store
        .list()?
        .into_iter()
        .filter(|p| p.is_pending() && agent_id.map_or(true, |a| p.agent_id == a))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalStatus;
    use chrono::Duration;
    use gov_store::MemoryStore;
    use serde_json::json;

    #[test]
    fn only_overdue_pending_proposals_expire() {
        let store = MemoryStore::<Proposal>::new();
        let overdue = Proposal::action("a", "deploy", json!({}), Duration::minutes(1));
        let fresh = Proposal::action("a", "deploy", json!({}), Duration::hours(2));
        let mut resolved = Proposal::action("a", "deploy", json!({}), Duration::minutes(1));
        resolved.approve("alice").unwrap();
        for p in [&overdue, &fresh, &resolved] {
            store.save(p).unwrap();
        }

        let later = Utc::now() + Duration::minutes(5);
        let expired = expire_pending(&store, later).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].proposal_id, overdue.proposal_id);

        let stored = store.get(&overdue.proposal_id.to_string()).unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Expired);
        let untouched = store.get(&resolved.proposal_id.to_string()).unwrap().unwrap();
        assert_eq!(untouched.status, ProposalStatus::Approved);

        assert!(expire_pending(&store, later).unwrap().is_empty());
        assert_eq!(pending(&store, Some("a")).unwrap().len(), 1);
    }
}
