// cache.rs — Governance cache: per-agent maturity snapshots.
//
// Layout: an outer map of agent id → slot, each slot behind its own lock.
// The outer lock is held only long enough to find or create a slot, so work
// for different agents never contends on anything but that lookup.
//
// Every slot carries a generation counter. Invalidation bumps it; population
// is compare-and-set against the generation the caller saw on its miss. A
// classifier that loaded an agent before a graduation commit therefore
// cannot write the old tier back after the commit's invalidation.
//
// Entries also remember the thresholds they were classified under. A reader
// holding different thresholds treats the entry as a miss, so a route still
// running on a pre-reload snapshot cannot hand its tiers to later routes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::agent::MaturityLevel;
use crate::maturity::MaturityThresholds;

/// A cached classification result. Always handed out by value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub level: MaturityLevel,
    /// The score the level was computed from.
    pub score: Option<f64>,
    pub thresholds: MaturityThresholds,
    pub computed_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.computed_at.checked_add_signed(self.ttl) {
            Some(expires) => now < expires,
            None => true,
        }
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    /// No fresh entry. `generation` must be passed back to `populate`.
    Miss { generation: u64 },
}

#[derive(Debug, Default)]
struct Slot {
    entry: Option<CacheEntry>,
    generation: u64,
}

/// Per-agent maturity cache with generation-checked population.
#[derive(Debug, Default)]
pub struct GovernanceCache {
    slots: RwLock<HashMap<String, Arc<RwLock<Slot>>>>,
}

impl GovernanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, agent_id: &str) -> Arc<RwLock<Slot>> {
        {
            let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get(agent_id) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Slot::default())))
            .clone()
    }

    /// Read the entry for an agent. Stale entries, and entries classified
    /// under other thresholds, are misses.
    pub fn lookup(
        &self,
        agent_id: &str,
        thresholds: &MaturityThresholds,
        now: DateTime<Utc>,
    ) -> CacheLookup {
        let slot = self.slot(agent_id);
        let slot = slot.read().unwrap_or_else(|e| e.into_inner());
        match &slot.entry {
            Some(entry) if entry.is_fresh(now) && entry.thresholds == *thresholds => {
                CacheLookup::Hit(entry.clone())
            }
            _ => CacheLookup::Miss {
                generation: slot.generation,
            },
        }
    }

    /// Snapshot of the raw entry, fresh or not.
    pub fn get(&self, agent_id: &str) -> Option<CacheEntry> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        let slot = slots.get(agent_id)?;
        let slot = slot.read().unwrap_or_else(|e| e.into_inner());
        slot.entry.clone()
    }

    /// Store a freshly computed level if no invalidation happened since
    /// `observed_generation` was read. Returns whether the entry was stored.
    pub fn populate(
        &self,
        agent_id: &str,
        level: MaturityLevel,
        score: Option<f64>,
        thresholds: MaturityThresholds,
        ttl: Duration,
        observed_generation: u64,
    ) -> bool {
        let slot = self.slot(agent_id);
        let mut slot = slot.write().unwrap_or_else(|e| e.into_inner());
        if slot.generation != observed_generation {
            tracing::debug!(
                agent_id,
                observed_generation,
                current_generation = slot.generation,
                "cache populate skipped, entry was invalidated"
            );
            return false;
        }
        slot.entry = Some(CacheEntry {
            level,
            score,
            thresholds,
            computed_at: Utc::now(),
            ttl,
        });
        true
    }

    /// Drop an agent's entry and fence off in-flight populations.
    pub fn invalidate(&self, agent_id: &str) {
        let slot = self.slot(agent_id);
        let mut slot = slot.write().unwrap_or_else(|e| e.into_inner());
        slot.entry = None;
        slot.generation += 1;
    }

    pub fn invalidate_all(&self) {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        for slot in slots.values() {
            let mut slot = slot.write().unwrap_or_else(|e| e.into_inner());
            slot.entry = None;
            slot.generation += 1;
        }
    }

    /// Number of agents holding a live entry.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .values()
            .filter(|s| s.read().unwrap_or_else(|e| e.into_inner()).entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
