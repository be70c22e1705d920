//! Heuristic rule engine for the request guard.
//!
//! No single header tells a script from a browser, so the classifier runs an
//! ordered list of named rules over the request's signals. Hard vetoes reject
//! on their own; soft indicators add their weight to a score that is compared
//! against a threshold; suspicious rules are counted separately with a lower
//! threshold. A careful client can still get through: this filters casual
//! tooling, not determined automation.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::request::RequestView;
use super::signals::RequestSignals;
use crate::models::ClassifierConfig;

/// `en`, `en-US`, `zh-Hant-TW`, `*`, each with an optional quality value
static ACCEPT_LANGUAGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^\s*(\*|[a-z]{2,3}(-[a-z0-9]{2,8}){0,2})(\s*;\s*q=[01](\.\d{1,3})?)?",
        r"(\s*,\s*(\*|[a-z]{2,3}(-[a-z0-9]{2,8}){0,2})(\s*;\s*q=[01](\.\d{1,3})?)?)*\s*$",
    ))
    .unwrap_or_else(|e| {
        log::error!("Failed to compile accept-language regex: {}", e);
        Regex::new(r"[^\s\S]").unwrap()
    })
});

/// A bare `name/version` token such as `curl/8.4.0` or `PostmanRuntime/7.32.0`
static TOOL_VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9._+-]*/v?\d[A-Za-z0-9._+-]*$").unwrap_or_else(|e| {
        log::error!("Failed to compile tool version regex: {}", e);
        Regex::new(r"[^\s\S]").unwrap()
    })
});

const COMPRESSION_TOKENS: [&str; 3] = ["gzip", "deflate", "br"];

/// How a rule contributes to the decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Rejects the request by itself
    HardVeto,
    /// Adds its weight to the indicator count
    SoftIndicator,
    /// Adds one to the suspicious count
    Suspicious,
}

/// Signal family a rule belongs to.
///
/// Soft indicators in the same category add at most one rule's weight to the
/// indicator count, so a browser that omits a whole family of headers (Firefox
/// and Safari send no client hints) scores one indicator, not three. Fetch
/// metadata is the exception: every missing header counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    ToolUserAgent,
    ToolHeader,
    BrowserHeaders,
    FetchMetadata,
    ClientHints,
    OriginContext,
    GenericUserAgent,
    AutomationFramework,
    SuspiciousUserAgent,
}

impl RuleCategory {
    /// Whether the category's soft indicators are capped at one
    pub fn is_capped(&self) -> bool {
        !matches!(self, RuleCategory::FetchMetadata)
    }
}

/// What a rule checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCondition {
    ToolUserAgent,
    ToolHeader,
    MalformedAcceptLanguage,
    MissingCompression,
    NonBrowserAccept,
    MissingFetchMetadata(&'static str),
    MissingClientHint(&'static str),
    NoOriginContext,
    WildcardAcceptWithoutLanguage,
    ShortUserAgent,
    SingleTokenUserAgent,
    RuntimeUserAgent,
    AutomationFramework,
    EmptyUserAgent,
    ToolVersionUserAgent,
    HeadlessBrowser,
}

impl RuleCondition {
    /// Evaluate the condition against one request's signals
    pub fn matches(&self, signals: &RequestSignals, config: &ClassifierConfig) -> bool {
        let ua = signals.user_agent_lower.as_str();
        match self {
            RuleCondition::ToolUserAgent => {
                !ua.is_empty() && contains_any(ua, &config.tool_user_agents)
            }
            RuleCondition::ToolHeader => !signals.tool_headers_present.is_empty(),
            RuleCondition::MalformedAcceptLanguage => match signals.accept_language.as_deref() {
                Some(value) => !ACCEPT_LANGUAGE_PATTERN.is_match(value),
                None => true,
            },
            RuleCondition::MissingCompression => {
                let encoding = signals
                    .accept_encoding
                    .as_deref()
                    .unwrap_or("")
                    .to_lowercase();
                !COMPRESSION_TOKENS.iter().any(|token| encoding.contains(token))
            }
            RuleCondition::NonBrowserAccept => {
                let accept = signals.accept.as_deref().unwrap_or("");
                !(accept.contains("text/html") || accept.contains("*/*"))
            }
            RuleCondition::MissingFetchMetadata(header) => {
                !signals.self_identified_crawler && signals.is_missing_fetch_metadata(header)
            }
            RuleCondition::MissingClientHint(header) => signals.is_missing_client_hint(header),
            RuleCondition::NoOriginContext => {
                !signals.self_identified_crawler
                    && signals.origin.is_none()
                    && signals.referer.is_none()
            }
            RuleCondition::WildcardAcceptWithoutLanguage => {
                signals.accept.as_deref().map(str::trim) == Some("*/*")
                    && signals.accept_language.is_none()
            }
            RuleCondition::ShortUserAgent => {
                signals
                    .user_agent
                    .as_deref()
                    .map(|agent| agent.chars().count())
                    .unwrap_or(0)
                    < config.min_user_agent_length
            }
            RuleCondition::SingleTokenUserAgent => {
                !ua.trim().contains(char::is_whitespace)
            }
            RuleCondition::RuntimeUserAgent => config
                .runtime_prefixes
                .iter()
                .any(|prefix| ua.starts_with(&prefix.to_lowercase())),
            RuleCondition::AutomationFramework => contains_any(ua, &config.automation_markers),
            RuleCondition::EmptyUserAgent => signals.user_agent.is_none(),
            RuleCondition::ToolVersionUserAgent => signals
                .user_agent
                .as_deref()
                .map(|agent| TOOL_VERSION_PATTERN.is_match(agent.trim()))
                .unwrap_or(false),
            RuleCondition::HeadlessBrowser => ua.contains("headless"),
        }
    }
}

/// A named heuristic
#[derive(Debug, Clone)]
pub struct Rule {
    /// Stable rule id, used to disable rules and in event details
    pub id: &'static str,
    pub description: &'static str,
    pub kind: RuleKind,
    pub category: RuleCategory,
    /// Contribution to the indicator count when a soft rule fires
    pub weight: u32,
    pub condition: RuleCondition,
}

impl Rule {
    const fn new(
        id: &'static str,
        description: &'static str,
        kind: RuleKind,
        category: RuleCategory,
        condition: RuleCondition,
    ) -> Self {
        Self {
            id,
            description,
            kind,
            category,
            weight: 1,
            condition,
        }
    }
}

/// The built-in rules, in evaluation order
pub fn default_rules() -> Vec<Rule> {
    use RuleCategory::*;
    use RuleCondition::*;
    use RuleKind::*;

    vec![
        Rule::new(
            "known-tool-user-agent",
            "User-agent names an HTTP tool",
            HardVeto,
            RuleCategory::ToolUserAgent,
            RuleCondition::ToolUserAgent,
        ),
        Rule::new(
            "tool-vendor-header",
            "Header only sent by an API tool",
            HardVeto,
            RuleCategory::ToolHeader,
            RuleCondition::ToolHeader,
        ),
        Rule::new(
            "malformed-accept-language",
            "Accept-Language missing or malformed",
            SoftIndicator,
            BrowserHeaders,
            MalformedAcceptLanguage,
        ),
        Rule::new(
            "missing-compression",
            "Accept-Encoding offers no compression",
            SoftIndicator,
            BrowserHeaders,
            MissingCompression,
        ),
        Rule::new(
            "non-browser-accept",
            "Accept does not ask for HTML",
            SoftIndicator,
            BrowserHeaders,
            NonBrowserAccept,
        ),
        Rule::new(
            "missing-sec-fetch-site",
            "Sec-Fetch-Site missing",
            SoftIndicator,
            FetchMetadata,
            MissingFetchMetadata("sec-fetch-site"),
        ),
        Rule::new(
            "missing-sec-fetch-mode",
            "Sec-Fetch-Mode missing",
            SoftIndicator,
            FetchMetadata,
            MissingFetchMetadata("sec-fetch-mode"),
        ),
        Rule::new(
            "missing-sec-fetch-dest",
            "Sec-Fetch-Dest missing",
            SoftIndicator,
            FetchMetadata,
            MissingFetchMetadata("sec-fetch-dest"),
        ),
        Rule::new(
            "missing-sec-ch-ua",
            "Sec-CH-UA missing",
            SoftIndicator,
            ClientHints,
            MissingClientHint("sec-ch-ua"),
        ),
        Rule::new(
            "missing-sec-ch-ua-mobile",
            "Sec-CH-UA-Mobile missing",
            SoftIndicator,
            ClientHints,
            MissingClientHint("sec-ch-ua-mobile"),
        ),
        Rule::new(
            "missing-sec-ch-ua-platform",
            "Sec-CH-UA-Platform missing",
            SoftIndicator,
            ClientHints,
            MissingClientHint("sec-ch-ua-platform"),
        ),
        Rule::new(
            "no-origin-context",
            "Neither Origin nor Referer sent",
            SoftIndicator,
            OriginContext,
            NoOriginContext,
        ),
        Rule::new(
            "wildcard-accept-without-language",
            "Accept */* with no Accept-Language",
            SoftIndicator,
            OriginContext,
            WildcardAcceptWithoutLanguage,
        ),
        Rule::new(
            "short-user-agent",
            "User-agent is very short",
            SoftIndicator,
            GenericUserAgent,
            ShortUserAgent,
        ),
        Rule::new(
            "single-token-user-agent",
            "User-agent is a single word",
            SoftIndicator,
            GenericUserAgent,
            SingleTokenUserAgent,
        ),
        Rule::new(
            "runtime-user-agent",
            "User-agent starts with a language runtime",
            SoftIndicator,
            GenericUserAgent,
            RuntimeUserAgent,
        ),
        Rule::new(
            "automation-framework",
            "User-agent names an automation library",
            SoftIndicator,
            RuleCategory::AutomationFramework,
            RuleCondition::AutomationFramework,
        ),
        Rule::new(
            "empty-user-agent",
            "No user-agent",
            Suspicious,
            SuspiciousUserAgent,
            EmptyUserAgent,
        ),
        Rule::new(
            "tool-version-user-agent",
            "User-agent is a bare name/version",
            Suspicious,
            SuspiciousUserAgent,
            ToolVersionUserAgent,
        ),
        Rule::new(
            "headless-browser",
            "User-agent reports a headless browser",
            Suspicious,
            SuspiciousUserAgent,
            HeadlessBrowser,
        ),
    ]
}

/// Classifier output for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub is_likely_automated: bool,
    pub indicator_count: u32,
    pub suspicious_count: u32,
    /// First hard veto that fired
    pub hard_veto: Option<String>,
    /// Ids of every rule that fired, in evaluation order
    pub triggered_rules: Vec<String>,
}

/// Rule engine state
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: ClassifierConfig,
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Create a rule engine with the built-in rules minus any disabled ones
    pub fn new(config: ClassifierConfig) -> Self {
        let rules = default_rules()
            .into_iter()
            .filter(|rule| !config.disabled_rules.iter().any(|id| id == rule.id))
            .collect();
        Self::with_rules(config, rules)
    }

    pub fn with_rules(config: ClassifierConfig, rules: Vec<Rule>) -> Self {
        Self { config, rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify a request
    pub fn classify(&self, request: &RequestView) -> Classification {
        let signals = RequestSignals::extract(request, &self.config);
        self.evaluate(&signals)
    }

    /// Evaluate every rule against precomputed signals
    pub fn evaluate(&self, signals: &RequestSignals) -> Classification {
        let mut classification = Classification::default();
        let mut scored_categories = HashSet::new();

        for rule in &self.rules {
            if !rule.condition.matches(signals, &self.config) {
                continue;
            }
            classification.triggered_rules.push(rule.id.to_string());
            match rule.kind {
                RuleKind::HardVeto => {
                    if classification.hard_veto.is_none() {
                        classification.hard_veto = Some(rule.id.to_string());
                    }
                }
                RuleKind::SoftIndicator => {
                    if rule.category.is_capped() && !scored_categories.insert(rule.category) {
                        continue;
                    }
                    classification.indicator_count =
                        classification.indicator_count.saturating_add(rule.weight);
                }
                RuleKind::Suspicious => {
                    classification.suspicious_count += 1;
                }
            }
        }

        classification.is_likely_automated = classification.hard_veto.is_some()
            || classification.indicator_count >= self.config.indicator_threshold
            || classification.suspicious_count >= self.config.suspicious_threshold;
        classification
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| haystack.contains(&needle.to_lowercase()))
}
