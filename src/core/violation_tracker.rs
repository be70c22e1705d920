//! Violation tracking and temporary blocking.

use std::collections::HashMap;

use log::warn;

use crate::models::ViolationConfig;

#[derive(Debug, Clone, Copy)]
struct ViolationState {
    violation_count: u32,
    last_violation_at: u64,
}

/// Counts rejected requests per client and blocks clients that collect too many.
///
/// An entry expires `block_duration_ms` after its last violation. Expired
/// entries are dropped when they are next looked at, or by `purge_expired`.
#[derive(Debug)]
pub struct ViolationTracker {
    config: ViolationConfig,
    entries: HashMap<String, ViolationState>,
}

impl ViolationTracker {
    pub fn new(config: ViolationConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    fn is_expired(&self, state: &ViolationState, now: u64) -> bool {
        now.saturating_sub(state.last_violation_at) >= self.config.block_duration_ms
    }

    /// Live state for `identifier`, evicting it if it has expired
    fn live_state(&mut self, identifier: &str, now: u64) -> Option<ViolationState> {
        let state = *self.entries.get(identifier)?;
        if self.is_expired(&state, now) {
            self.entries.remove(identifier);
            return None;
        }
        Some(state)
    }

    /// Record a violation and return the client's new violation count
    pub fn record_violation(&mut self, identifier: &str, now: u64) -> u32 {
        let previous = self
            .live_state(identifier, now)
            .map(|state| state.violation_count)
            .unwrap_or(0);
        let violation_count = previous.saturating_add(1);

        self.entries.insert(
            identifier.to_string(),
            ViolationState {
                violation_count,
                last_violation_at: now,
            },
        );

        if violation_count == self.config.block_threshold {
            warn!(
                "Client {} blocked for {} seconds after {} violations",
                identifier,
                self.config.block_duration_ms / 1000,
                violation_count
            );
        }

        violation_count
    }

    /// Whether `identifier` is currently blocked
    pub fn is_blocked(&mut self, identifier: &str, now: u64) -> bool {
        self.live_state(identifier, now)
            .map(|state| state.violation_count >= self.config.block_threshold)
            .unwrap_or(false)
    }

    /// Violations still counting against `identifier`
    pub fn violation_count(&mut self, identifier: &str, now: u64) -> u32 {
        self.live_state(identifier, now)
            .map(|state| state.violation_count)
            .unwrap_or(0)
    }

    /// Remove every expired entry; returns how many were removed
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        let duration = self.config.block_duration_ms;
        self.entries
            .retain(|_, state| now.saturating_sub(state.last_violation_at) < duration);
        before - self.entries.len()
    }

    /// Lift any block on `identifier`
    pub fn clear(&mut self, identifier: &str) {
        self.entries.remove(identifier);
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}
