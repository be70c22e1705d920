//! Rate limiting implementation for the request guard.
//!
//! This module provides per-client rate limiting behind the `RateLimitStrategy`
//! trait. The shipped strategy is a fixed-window counter kept in process memory,
//! so limits are enforced per running instance.

use std::collections::HashMap;

use log::debug;

use crate::models::{RateLimitConfig, RateLimitInfo};

/// A per-client rate limiting algorithm
#[cfg_attr(test, mockall::automock)]
pub trait RateLimitStrategy {
    /// Count a request from `identifier` at `now` and report whether it fits
    fn check(&mut self, identifier: &str, now: u64) -> RateLimitInfo;

    /// Drop state that can no longer affect a decision; returns entries removed
    fn purge_expired(&mut self, now: u64) -> usize;

    /// Forget everything about `identifier`
    fn reset(&mut self, identifier: &str);

    /// Number of clients currently tracked
    fn tracked_clients(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_reset_at: u64,
}

/// Fixed-window rate limiter.
///
/// Windows do not slide, so a client can fit up to twice `max_requests` into a
/// short burst that straddles a window boundary.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    config: RateLimitConfig,
    windows: HashMap<String, RateWindow>,
    next_sweep_at: u64,
}

impl FixedWindowRateLimiter {
    /// Create a new rate limiter instance
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            next_sweep_at: 0,
        }
    }

    fn sweep_if_due(&mut self, now: u64) {
        if now < self.next_sweep_at {
            return;
        }
        let removed = self.purge_expired(now);
        if removed > 0 {
            debug!("Swept {} expired rate windows", removed);
        }
        self.next_sweep_at = now.saturating_add(self.config.sweep_interval_ms);
    }
}

impl RateLimitStrategy for FixedWindowRateLimiter {
    /// Check if a request should be rate limited
    ///
    /// # Arguments
    ///
    /// * `identifier` - The client identifier to rate limit
    /// * `now` - Current time in epoch milliseconds
    ///
    /// # Returns
    ///
    /// * `allowed` is true while the window count is within `max_requests`
    /// * `remaining` is the number of requests left in the window, never negative
    fn check(&mut self, identifier: &str, now: u64) -> RateLimitInfo {
        self.sweep_if_due(now);

        let window_duration = self.config.window_duration_ms;
        let window = self
            .windows
            .entry(identifier.to_string())
            .or_insert(RateWindow {
                count: 0,
                window_reset_at: now.saturating_add(window_duration),
            });

        if now >= window.window_reset_at {
            window.count = 1;
            window.window_reset_at = now.saturating_add(window_duration);
        } else {
            window.count = window.count.saturating_add(1);
        }

        let max = self.config.max_requests;
        RateLimitInfo {
            allowed: window.count <= max,
            remaining: max.saturating_sub(window.count),
        }
    }

    fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.window_reset_at >= now);
        before - self.windows.len()
    }

    /// Reset the rate limit for a given client
    fn reset(&mut self, identifier: &str) {
        self.windows.remove(identifier);
    }

    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
