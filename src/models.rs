use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::rule_engine::Classification;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_duration_ms: u64,
    /// Minimum time between full sweeps of expired windows
    pub sweep_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_duration_ms: 15 * 60 * 1000,
            sweep_interval_ms: 60 * 1000,
        }
    }
}

/// Violation tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationConfig {
    /// Violations needed before a client is blocked
    pub block_threshold: u32,
    /// How long a block lasts after the last violation, in milliseconds
    pub block_duration_ms: u64,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self {
            block_threshold: 5,
            block_duration_ms: 60 * 60 * 1000,
        }
    }
}

/// Origin allow-list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            allowed_origins: strings(&[
                "https://hylmirafif.me",
                "https://www.hylmirafif.me",
                "http://localhost:3000",
                "http://127.0.0.1:3000",
                "https://pwbs-hylmii.vercel.app",
            ]),
        }
    }
}

/// Heuristic classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// User-agent substrings that reject a request outright
    pub tool_user_agents: Vec<String>,
    /// Header names only sent by API tools; presence rejects outright
    pub tool_headers: Vec<String>,
    /// User-agent substrings naming browser automation libraries
    pub automation_markers: Vec<String>,
    /// User-agent prefixes naming a scripting runtime
    pub runtime_prefixes: Vec<String>,
    /// User-agent substrings marking a self-identified crawler
    pub crawler_markers: Vec<String>,
    /// User agents shorter than this count as an indicator
    pub min_user_agent_length: usize,
    /// Soft indicator weight needed to reject
    pub indicator_threshold: u32,
    /// Suspicious matches needed to reject
    pub suspicious_threshold: u32,
    /// Rule ids switched off
    pub disabled_rules: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tool_user_agents: strings(&[
                "postman",
                "insomnia",
                "httpie",
                "curl",
                "wget",
                "python-requests",
                "python-urllib",
                "aiohttp",
                "go-http-client",
                "axios/",
                "node-fetch",
                "undici",
                "okhttp",
                "apache-httpclient",
                "libwww-perl",
                "newman",
                "thunder client",
                "restsharp",
                "unirest",
                "scrapy",
                "phantomjs",
                "headlesschrome",
                "powershell",
            ]),
            tool_headers: strings(&["postman-token"]),
            automation_markers: strings(&[
                "selenium",
                "webdriver",
                "chromedriver",
                "geckodriver",
                "puppeteer",
                "playwright",
                "cypress",
                "nightmare",
            ]),
            runtime_prefixes: strings(&[
                "python", "node", "java", "go-", "go/", "ruby", "php", "perl", "dart", "rust",
                "deno", "bun/",
            ]),
            crawler_markers: strings(&["bot", "crawler", "spider", "slurp"]),
            min_user_agent_length: 20,
            indicator_threshold: 2,
            suspicious_threshold: 1,
            disabled_rules: Vec::new(),
        }
    }
}

/// Header policy for the later validation steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderPolicyConfig {
    /// Secondary user-agent deny-list
    pub blocked_user_agents: Vec<String>,
    /// Secondary suspicious user-agent patterns
    pub suspicious_user_agents: Vec<String>,
    /// Headers every request must carry
    pub required_headers: Vec<String>,
    /// Headers required on requests that carry a body
    pub required_body_headers: Vec<String>,
    /// Tokens identifying a browser in the user-agent
    pub browser_indicators: Vec<String>,
    /// Minimum user-agent length for the browser check
    pub min_browser_user_agent_length: usize,
}

impl Default for HeaderPolicyConfig {
    fn default() -> Self {
        Self {
            blocked_user_agents: strings(&[
                "postman",
                "insomnia",
                "httpie",
                "curl",
                "wget",
                "python-requests",
                "go-http-client",
                "axios/",
                "node-fetch",
                "okhttp",
                "apache-httpclient",
                "newman",
                "thunderclient",
                "restsharp",
                "unirest",
                "powershell",
            ]),
            suspicious_user_agents: strings(&[
                "bot", "spider", "crawler", "scraper", "test", "monitor",
            ]),
            required_headers: strings(&["user-agent", "accept"]),
            required_body_headers: strings(&["content-type"]),
            browser_indicators: strings(&[
                "mozilla", "chrome", "safari", "firefox", "edge", "opera",
            ]),
            min_browser_user_agent_length: 50,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Entries kept before the oldest is evicted
    pub capacity: usize,
    /// Entries in each top-N list of the analysis
    pub top_n: usize,
    /// High/critical entries reported by the analysis
    pub recent_threats: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            top_n: 10,
            recent_threats: 20,
        }
    }
}

/// Everything the request guard needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub rate_limit: RateLimitConfig,
    pub violations: ViolationConfig,
    pub origins: OriginConfig,
    pub classifier: ClassifierConfig,
    pub headers: HeaderPolicyConfig,
    pub event_log: EventLogConfig,
    /// Paths under the guarded scope that bypass validation
    pub exempt_paths: Vec<String>,
    /// How often the background task purges expired state, in seconds
    pub cleanup_interval_seconds: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            violations: ViolationConfig::default(),
            origins: OriginConfig::default(),
            classifier: ClassifierConfig::default(),
            headers: HeaderPolicyConfig::default(),
            event_log: EventLogConfig::default(),
            exempt_paths: strings(&["/api/v1/health"]),
            cleanup_interval_seconds: 300,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Admin access to the security endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token expected on admin endpoints; no default, must be configured
    pub api_key: String,
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Admin configuration
    pub admin: AdminConfig,
    /// Request guard configuration
    pub guard: GuardConfig,
}

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub remaining: u32,
}

/// Why a request was rejected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    TemporarilyBlocked,
    RateLimitExceeded,
    AutomatedClient,
    InvalidOrigin,
    BlockedUserAgent,
    MissingRequiredHeaders,
    NotABrowser,
    CsrfValidationFailed,
}

impl RejectionReason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::TemporarilyBlocked => "TEMPORARILY_BLOCKED",
            RejectionReason::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            RejectionReason::AutomatedClient => "AUTOMATED_CLIENT",
            RejectionReason::InvalidOrigin => "INVALID_ORIGIN",
            RejectionReason::BlockedUserAgent => "BLOCKED_USER_AGENT",
            RejectionReason::MissingRequiredHeaders => "MISSING_REQUIRED_HEADERS",
            RejectionReason::NotABrowser => "NOT_A_BROWSER",
            RejectionReason::CsrfValidationFailed => "CSRF_VALIDATION_FAILED",
        }
    }

    /// Severity recorded for a request rejected for this reason
    pub fn severity(&self) -> Severity {
        match self {
            RejectionReason::BlockedUserAgent | RejectionReason::RateLimitExceeded => {
                Severity::High
            }
            RejectionReason::InvalidOrigin | RejectionReason::CsrfValidationFailed => {
                Severity::Critical
            }
            _ => Severity::Medium,
        }
    }

    /// Whether a rejection for this reason counts as a new violation
    pub fn counts_as_violation(&self) -> bool {
        !matches!(self, RejectionReason::TemporarilyBlocked)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            RejectionReason::TemporarilyBlocked => "Client temporarily blocked",
            RejectionReason::RateLimitExceeded => "Rate limit exceeded",
            RejectionReason::AutomatedClient => "Automated client detected",
            RejectionReason::InvalidOrigin => "Invalid origin",
            RejectionReason::BlockedUserAgent => "Blocked user agent",
            RejectionReason::MissingRequiredHeaders => "Missing required headers",
            RejectionReason::NotABrowser => "Request does not appear to be from a browser",
            RejectionReason::CsrfValidationFailed => "CSRF validation failed",
        };
        f.write_str(message)
    }
}

/// Outcome of validating one request
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub valid: bool,
    pub reason: Option<RejectionReason>,
    pub rate_limit: Option<RateLimitInfo>,
    /// Classifier output, present once the classifier has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl Verdict {
    pub fn allow(rate_limit: RateLimitInfo, classification: Classification) -> Self {
        Self {
            valid: true,
            reason: None,
            rate_limit: Some(rate_limit),
            classification: Some(classification),
        }
    }

    pub fn reject(reason: RejectionReason, rate_limit: Option<RateLimitInfo>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            rate_limit,
            classification: None,
        }
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    /// Remaining requests in the current window, zero when unknown
    pub fn remaining(&self) -> u32 {
        self.rate_limit.map(|info| info.remaining).unwrap_or(0)
    }

    pub fn severity(&self) -> Severity {
        self.reason.map(|r| r.severity()).unwrap_or(Severity::Low)
    }

    /// Label used for metrics
    pub fn outcome_label(&self) -> &'static str {
        match self.reason {
            Some(reason) => reason.code(),
            None => "ALLOWED",
        }
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn is_threat(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// Event kinds for the security log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RequestAllowed,
    RequestBlocked,
}

/// Security log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub client_identifier: String,
    pub user_agent: String,
    pub method: String,
    pub url: String,
    pub details: HashMap<String, serde_json::Value>,
    pub severity: Severity,
}

impl SecurityEvent {
    pub fn is_blocked(&self) -> bool {
        self.kind == EventKind::RequestBlocked
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
