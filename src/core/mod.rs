//! Core functionality for the request guard.
//!
//! This module contains the request view the checks run against, client
//! identification, rate limiting, violation tracking, the heuristic rule
//! engine, origin and header checks, the event log and the validator that
//! ties them together.

pub mod analytics;
pub mod client_identity;
pub mod header_checks;
pub mod monitoring;
pub mod origin;
pub mod rate_limiter;
pub mod request;
pub mod rule_engine;
pub mod signals;
pub mod validator;
pub mod violation_tracker;

pub use analytics::{SecurityAnalysis, SecurityEventLog};
pub use client_identity::resolve_client_identifier;
pub use monitoring::{assess_threat, ThreatAssessment, ThreatLevel};
pub use rate_limiter::{FixedWindowRateLimiter, RateLimitStrategy};
pub use request::RequestView;
pub use rule_engine::{Classification, Rule, RuleCategory, RuleCondition, RuleEngine, RuleKind};
pub use validator::{PurgeStats, RequestGuard, SecurityState};
pub use violation_tracker::ViolationTracker;
