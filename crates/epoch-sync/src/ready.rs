//! Mirror of each participant's "ready to advance" flag.
//!
//! Seeded from the backend snapshot, then updated one key at a time by the
//! `ready_changed` broadcast. Whether the cycle advances is decided by the
//! backend; the helpers here are for display only.

use std::collections::BTreeMap;

use crate::protocol::ReadySeed;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadyStateAggregator {
    states: BTreeMap<String, bool>,
}

impl ReadyStateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole map. A seed without `ready` counts as not ready.
    pub fn init(&mut self, seeds: impl IntoIterator<Item = ReadySeed>) {
        self.states = seeds
            .into_iter()
            .map(|seed| (seed.group_id, seed.ready.unwrap_or(false)))
            .collect();
    }

    /// Set exactly one key, adding it if unseen. Returns the previous value.
    pub fn on_ready_changed(&mut self, group_id: &str, ready: bool) -> Option<bool> {
        self.states.insert(group_id.to_string(), ready)
    }

    pub fn get(&self, group_id: &str) -> Option<bool> {
        self.states.get(group_id).copied()
    }

    pub fn states(&self) -> &BTreeMap<String, bool> {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.states.values().filter(|ready| **ready).count()
    }

    /// True when at least one participant is known and all are ready.
    pub fn all_ready(&self) -> bool {
        !self.states.is_empty() && self.states.values().all(|ready| *ready)
    }
}
