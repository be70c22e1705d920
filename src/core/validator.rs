//! Request validation for the request guard.
//!
//! `RequestGuard` runs every check in a fixed order and stops at the first
//! failure. All mutable state (rate windows, violations, the event log) lives
//! in one `SecurityState` behind a mutex, owned by the guard instance rather
//! than by globals, so each process enforces its own limits.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use serde_json::json;
use uuid::Uuid;

use super::analytics::{SecurityAnalysis, SecurityEventLog};
use super::client_identity::resolve_client_identifier;
use super::header_checks::{check_user_agent, looks_like_browser, validate_headers};
use super::monitoring::assess_threat;
use super::origin::{check_origin, validate_csrf};
use super::rate_limiter::{FixedWindowRateLimiter, RateLimitStrategy};
use super::request::RequestView;
use super::rule_engine::RuleEngine;
use super::violation_tracker::ViolationTracker;
use crate::models::{EventKind, GuardConfig, RejectionReason, SecurityEvent, Verdict};
use crate::utils::millis_to_datetime;

/// Mutable per-instance state shared by all requests
pub struct SecurityState {
    pub rate_limiter: Box<dyn RateLimitStrategy + Send>,
    pub violations: ViolationTracker,
    pub events: SecurityEventLog,
}

impl SecurityState {
    pub fn new(config: &GuardConfig) -> Self {
        Self::with_rate_limiter(
            config,
            Box::new(FixedWindowRateLimiter::new(config.rate_limit.clone())),
        )
    }

    /// State using a different rate limiting strategy
    pub fn with_rate_limiter(
        config: &GuardConfig,
        rate_limiter: Box<dyn RateLimitStrategy + Send>,
    ) -> Self {
        Self {
            rate_limiter,
            violations: ViolationTracker::new(config.violations.clone()),
            events: SecurityEventLog::new(config.event_log.clone()),
        }
    }
}

/// Counts from a purge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub rate_windows: usize,
    pub violations: usize,
}

/// Validates requests and records the outcome
pub struct RequestGuard {
    config: GuardConfig,
    rules: RuleEngine,
    state: Mutex<SecurityState>,
}

impl RequestGuard {
    pub fn new(config: GuardConfig) -> Self {
        let state = SecurityState::new(&config);
        Self::with_state(config, state)
    }

    pub fn with_state(config: GuardConfig, state: SecurityState) -> Self {
        Self {
            rules: RuleEngine::new(config.classifier.clone()),
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    // A panic while holding the lock leaves the maps usable; keep serving.
    fn lock(&self) -> MutexGuard<'_, SecurityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Paths that bypass the guard entirely
    pub fn is_exempt(&self, path: &str) -> bool {
        self.config.exempt_paths.iter().any(|exempt| exempt == path)
    }

    /// Run every check against `request` without recording the outcome.
    ///
    /// The rate limit window is still consumed.
    pub fn validate(&self, request: &RequestView, now: u64) -> Verdict {
        let identifier = resolve_client_identifier(request);
        let mut state = self.lock();
        self.run_checks(&mut state, request, &identifier, now)
    }

    /// Validate `request`, log the verdict and count a violation if it was rejected
    pub fn inspect(&self, request: &RequestView, now: u64) -> Verdict {
        let identifier = resolve_client_identifier(request);
        let mut state = self.lock();
        let verdict = self.run_checks(&mut state, request, &identifier, now);

        let mut details = HashMap::new();
        details.insert("remaining".to_string(), json!(verdict.remaining()));
        if let Some(classification) = &verdict.classification {
            details.insert(
                "indicator_count".to_string(),
                json!(classification.indicator_count),
            );
            if !classification.triggered_rules.is_empty() {
                details.insert(
                    "triggered_rules".to_string(),
                    json!(classification.triggered_rules),
                );
            }
        }

        let kind = match verdict.reason {
            Some(reason) => {
                let previously_flagged = state.violations.violation_count(&identifier, now) > 0;
                let threat = assess_threat(request, previously_flagged);
                details.insert("reason".to_string(), json!(reason.to_string()));
                details.insert("code".to_string(), json!(reason.code()));
                details.insert("threat_level".to_string(), json!(threat.level));
                details.insert("threat_reasons".to_string(), json!(threat.reasons));

                if reason.counts_as_violation() {
                    let count = state.violations.record_violation(&identifier, now);
                    details.insert("violation_count".to_string(), json!(count));
                }
                warn!(
                    "Blocked {} {} from {}: {}",
                    request.method(),
                    request.url(),
                    identifier,
                    reason
                );
                EventKind::RequestBlocked
            }
            None => {
                debug!(
                    "Allowed {} {} from {} ({} remaining)",
                    request.method(),
                    request.url(),
                    identifier,
                    verdict.remaining()
                );
                EventKind::RequestAllowed
            }
        };

        state.events.record(SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: millis_to_datetime(now),
            kind,
            client_identifier: identifier,
            user_agent: request.header("user-agent").unwrap_or("unknown").to_string(),
            method: request.method().to_string(),
            url: request.url().to_string(),
            details,
            severity: verdict.severity(),
        });
        drop(state);

        metrics::increment_counter!(
            "request_guard_verdicts_total",
            "outcome" => verdict.outcome_label()
        );
        verdict
    }

    fn run_checks(
        &self,
        state: &mut SecurityState,
        request: &RequestView,
        identifier: &str,
        now: u64,
    ) -> Verdict {
        if state.violations.is_blocked(identifier, now) {
            return Verdict::reject(RejectionReason::TemporarilyBlocked, None);
        }

        let rate_limit = state.rate_limiter.check(identifier, now);
        if !rate_limit.allowed {
            return Verdict::reject(RejectionReason::RateLimitExceeded, Some(rate_limit));
        }

        let classification = self.rules.classify(request);
        let reject = |reason| {
            Verdict::reject(reason, Some(rate_limit)).with_classification(classification.clone())
        };

        if classification.is_likely_automated {
            return reject(RejectionReason::AutomatedClient);
        }

        let allowed_origins = &self.config.origins.allowed_origins;
        if !check_origin(request, allowed_origins) {
            return reject(RejectionReason::InvalidOrigin);
        }

        let policy = &self.config.headers;
        if !check_user_agent(request, policy) {
            return reject(RejectionReason::BlockedUserAgent);
        }
        if !validate_headers(request, policy) {
            return reject(RejectionReason::MissingRequiredHeaders);
        }
        if !looks_like_browser(request, policy) {
            return reject(RejectionReason::NotABrowser);
        }
        if request.is_mutating() && !validate_csrf(request, allowed_origins) {
            return reject(RejectionReason::CsrfValidationFailed);
        }

        Verdict::allow(rate_limit, classification)
    }

    /// Up to `limit` logged events, newest first
    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.lock().events.query(limit)
    }

    /// Up to `limit` logged events for one client, newest first
    pub fn client_events(&self, identifier: &str, limit: usize) -> Vec<SecurityEvent> {
        self.lock().events.query_client(identifier, limit)
    }

    pub fn analyze(&self) -> SecurityAnalysis {
        self.lock().events.analyze()
    }

    /// Drop expired rate windows and violation entries
    pub fn purge_expired(&self, now: u64) -> PurgeStats {
        let mut state = self.lock();
        let stats = PurgeStats {
            rate_windows: state.rate_limiter.purge_expired(now),
            violations: state.violations.purge_expired(now),
        };
        metrics::gauge!(
            "request_guard_tracked_clients",
            state.rate_limiter.tracked_clients() as f64
        );
        stats
    }

    /// Clients with a live rate window
    pub fn tracked_clients(&self) -> usize {
        self.lock().rate_limiter.tracked_clients()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate_limiter::MockRateLimitStrategy;
    use crate::models::{RateLimitInfo, Severity};
    use crate::test_support::{
        browser_request, browser_request_from, guard_config, hintless_browser_request, CHROME_UA,
        FIREFOX_UA, SAFARI_UA,
    };

    const HOUR: u64 = 60 * 60 * 1000;
    const START: u64 = 1_700_000_000_000;

    fn guard() -> RequestGuard {
        RequestGuard::new(guard_config())
    }

    fn tool_request(client: &str, agent: &str) -> RequestView {
        RequestView::new("POST", "http://localhost:3000/api/contact")
            .with_header("x-forwarded-for", client)
            .with_header("user-agent", agent)
            .with_header("accept", "*/*")
            .with_header("content-type", "application/json")
    }

    #[test]
    fn test_full_browser_headers_pass() {
        let guard = guard();
        for method in ["GET", "POST"] {
            let verdict = guard.validate(&browser_request_from(method, "1.1.1.1"), START);
            assert!(verdict.valid, "{method}: {:?}", verdict.reason);
            assert!(verdict.reason.is_none());
        }
    }

    #[test]
    fn test_browsers_without_client_hints_pass() {
        let guard = guard();
        for (agent, client) in [(FIREFOX_UA, "1.1.1.2"), (SAFARI_UA, "1.1.1.3")] {
            for method in ["GET", "POST"] {
                let request = hintless_browser_request(method, agent, client);
                let verdict = guard.validate(&request, START);
                assert!(verdict.valid, "{agent} {method}: {:?}", verdict.reason);
                let classification = verdict.classification.expect("classifier ran");
                assert_eq!(classification.indicator_count, 1);
            }
        }
    }

    #[test]
    fn test_firefox_is_never_blocked_within_its_rate_limit() {
        let guard = guard();
        for i in 0..5 {
            let request = hintless_browser_request("GET", FIREFOX_UA, "1.1.1.4");
            let verdict = guard.inspect(&request, START + i);
            assert!(verdict.valid, "request {i}: {:?}", verdict.reason);
        }
        let mut state = guard.lock();
        assert_eq!(state.violations.violation_count("1.1.1.4", START + 5), 0);
    }

    #[test]
    fn test_rate_limit_counts_down_then_rejects() {
        let guard = guard();
        for (i, expected) in [4, 3, 2, 1, 0].into_iter().enumerate() {
            let verdict = guard.validate(&browser_request_from("GET", "1.2.3.4"), START + i as u64);
            assert!(verdict.valid);
            assert_eq!(verdict.remaining(), expected);
        }
        let verdict = guard.validate(&browser_request_from("GET", "1.2.3.4"), START + 5);
        assert_eq!(verdict.reason, Some(RejectionReason::RateLimitExceeded));
        assert_eq!(
            verdict.rate_limit,
            Some(RateLimitInfo {
                allowed: false,
                remaining: 0
            })
        );
    }

    /// Chromium header set without origin context, optionally with a body
    fn request_without_origin(method: &str, client: &str) -> RequestView {
        let mut req = RequestView::new(method, "http://localhost:3000/api/contact");
        for (name, value) in [
            ("x-forwarded-for", client),
            ("user-agent", CHROME_UA),
            ("accept", "text/html,*/*;q=0.8"),
            ("accept-language", "en-US,en;q=0.9"),
            ("accept-encoding", "gzip, deflate, br"),
            ("connection", "keep-alive"),
            ("sec-fetch-site", "same-origin"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-dest", "empty"),
            ("sec-ch-ua", "\"Chromium\";v=\"120\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
        ] {
            req.insert_header(name, value);
        }
        if req.has_body() {
            req.insert_header("content-type", "application/json");
        }
        req
    }

    #[test]
    fn test_tool_user_agent_rejected_regardless_of_headers() {
        let guard = guard();
        let mut req = RequestView::new("GET", "http://localhost:3000/api/contact");
        for (name, value) in [
            ("x-forwarded-for", "2.2.2.2"),
            ("user-agent", "PostmanRuntime/7.32.0"),
            ("accept", "text/html,*/*;q=0.8"),
            ("accept-language", "en-US,en;q=0.9"),
            ("accept-encoding", "gzip, deflate, br"),
            ("connection", "keep-alive"),
            ("origin", "http://localhost:3000"),
            ("sec-fetch-site", "same-origin"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-dest", "empty"),
            ("sec-ch-ua", "\"Chromium\";v=\"120\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
        ] {
            req.insert_header(name, value);
        }
        let verdict = guard.validate(&req, START);
        assert_eq!(verdict.reason, Some(RejectionReason::AutomatedClient));
        let classification = verdict.classification.expect("classifier ran");
        assert_eq!(classification.hard_veto.as_deref(), Some("known-tool-user-agent"));
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let guard = guard();
        let mut req = request_without_origin("POST", "2.3.4.5");
        req.insert_header("origin", "https://evil.example");
        let verdict = guard.validate(&req, START);
        assert_eq!(verdict.reason, Some(RejectionReason::InvalidOrigin));
        assert_eq!(verdict.severity(), Severity::Critical);
    }

    #[test]
    fn test_post_without_origin_context_fails_csrf() {
        let guard = guard();
        let verdict = guard.validate(&request_without_origin("POST", "2.4.6.8"), START);
        assert_eq!(verdict.reason, Some(RejectionReason::CsrfValidationFailed));
        assert_eq!(verdict.classification.map(|c| c.indicator_count), Some(1));

        // the same request as a GET has nothing to forge
        let verdict = guard.validate(&request_without_origin("GET", "2.4.6.8"), START + 1);
        assert!(verdict.valid, "{:?}", verdict.reason);
    }

    #[test]
    fn test_repeated_rejections_block_then_expire() {
        let guard = guard();
        for i in 0..5 {
            let verdict = guard.inspect(&tool_request("9.9.9.9", "curl/8.4.0"), START + i);
            assert_eq!(verdict.reason, Some(RejectionReason::AutomatedClient));
        }

        // a perfect browser request from the same client is now refused
        let verdict = guard.inspect(&browser_request_from("GET", "9.9.9.9"), START + 5);
        assert_eq!(verdict.reason, Some(RejectionReason::TemporarilyBlocked));
        assert!(verdict.rate_limit.is_none());

        // other clients are unaffected
        assert!(guard.inspect(&browser_request_from("GET", "8.8.8.8"), START + 6).valid);

        // an hour after the last violation the block lifts
        let last_violation = START + 4;
        let verdict = guard.inspect(&browser_request_from("GET", "9.9.9.9"), last_violation + HOUR);
        assert!(verdict.valid, "{:?}", verdict.reason);
    }

    #[test]
    fn test_blocked_requests_do_not_extend_block() {
        let guard = guard();
        for i in 0..5 {
            guard.inspect(&tool_request("5.5.5.5", "wget/1.21"), START + i);
        }
        for i in 0..10 {
            let verdict = guard.inspect(&tool_request("5.5.5.5", "wget/1.21"), START + 1_000 + i);
            assert_eq!(verdict.reason, Some(RejectionReason::TemporarilyBlocked));
        }
        let mut state = guard.lock();
        assert_eq!(state.violations.violation_count("5.5.5.5", START + 2_000), 5);
    }

    #[test]
    fn test_rate_limited_requests_count_as_violations() {
        let mut config = guard_config();
        config.rate_limit.max_requests = 1;
        let guard = RequestGuard::new(config);

        assert!(guard.inspect(&browser_request_from("GET", "4.4.4.4"), START).valid);
        for i in 1..=5 {
            let verdict = guard.inspect(&browser_request_from("GET", "4.4.4.4"), START + i);
            assert_eq!(verdict.reason, Some(RejectionReason::RateLimitExceeded));
        }
        let verdict = guard.inspect(&browser_request_from("GET", "4.4.4.4"), START + 6);
        assert_eq!(verdict.reason, Some(RejectionReason::TemporarilyBlocked));
    }

    #[test]
    fn test_every_verdict_is_logged_with_severity() {
        let guard = guard();
        guard.inspect(&browser_request_from("GET", "3.3.3.3"), START);
        guard.inspect(&tool_request("3.3.3.3", "curl/8.4.0"), START + 1);

        let events = guard.recent_events(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::RequestBlocked);
        assert_eq!(events[0].severity, Severity::Medium);
        assert_eq!(events[0].details["code"], json!("AUTOMATED_CLIENT"));
        assert_eq!(events[0].details["violation_count"], json!(1));
        assert_eq!(events[0].user_agent, "curl/8.4.0");
        assert_eq!(events[1].kind, EventKind::RequestAllowed);
        assert_eq!(events[1].severity, Severity::Low);
        assert_eq!(events[1].client_identifier, "3.3.3.3");

        let analysis = guard.analyze();
        assert_eq!(analysis.total_requests, 2);
        assert_eq!(analysis.blocked_requests, 1);
        assert_eq!(guard.client_events("3.3.3.3", 10).len(), 2);
    }

    #[test]
    fn test_validate_does_not_record() {
        let guard = guard();
        guard.validate(&tool_request("6.6.6.6", "curl/8.4.0"), START);
        assert!(guard.recent_events(10).is_empty());
        let mut state = guard.lock();
        assert_eq!(state.violations.violation_count("6.6.6.6", START), 0);
    }

    #[test]
    fn test_rate_limit_strategy_is_pluggable() {
        let config = guard_config();
        let mut limiter = MockRateLimitStrategy::new();
        limiter
            .expect_check()
            .withf(|identifier, _| identifier == "7.7.7.7")
            .times(1)
            .returning(|_, _| RateLimitInfo {
                allowed: false,
                remaining: 0,
            });
        let state = SecurityState::with_rate_limiter(&config, Box::new(limiter));
        let guard = RequestGuard::with_state(config, state);

        let verdict = guard.validate(&browser_request_from("GET", "7.7.7.7"), START);
        assert_eq!(verdict.reason, Some(RejectionReason::RateLimitExceeded));
        assert!(verdict.classification.is_none());
    }

    #[test]
    fn test_purge_reports_removed_entries() {
        let guard = guard();
        guard.inspect(&tool_request("1.0.0.1", "curl/8.4.0"), START);
        guard.inspect(&browser_request("GET"), START);
        assert_eq!(guard.tracked_clients(), 2);

        let stats = guard.purge_expired(START + 2 * HOUR);
        assert_eq!(
            stats,
            PurgeStats {
                rate_windows: 2,
                violations: 1
            }
        );
        assert_eq!(guard.tracked_clients(), 0);
    }

    #[test]
    fn test_exempt_paths() {
        let guard = guard();
        assert!(guard.is_exempt("/api/v1/health"));
        assert!(!guard.is_exempt("/api/contact"));
    }
}
