//! Threat assessment for the request guard.
//!
//! A coarse second opinion attached to blocked events so the admin view can
//! tell noisy tooling from repeat offenders.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::request::RequestView;

static SUSPICIOUS_AGENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)postman|insomnia|curl|wget|python|bot|scanner|crawler|spider|scraper|exploit")
        .unwrap_or_else(|e| {
            log::error!("Failed to compile suspicious agent regex: {}", e);
            Regex::new(r"[^\s\S]").unwrap()
        })
});

const COMMON_BROWSER_HEADERS: [&str; 3] = ["accept", "accept-language", "accept-encoding"];

/// Threat level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    Safe,
    Suspicious,
    Dangerous,
}

/// Threat level plus the reasons behind it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub level: ThreatLevel,
    pub reasons: Vec<String>,
}

/// Assess a request.
///
/// # Arguments
///
/// * `request` - The request being assessed
/// * `previously_flagged` - Whether the client already has violations on record
pub fn assess_threat(request: &RequestView, previously_flagged: bool) -> ThreatAssessment {
    let mut reasons = Vec::new();

    if previously_flagged {
        reasons.push("Client previously flagged for suspicious activity".to_string());
    }

    if SUSPICIOUS_AGENT_PATTERN.is_match(request.user_agent()) {
        reasons.push("Suspicious user agent detected".to_string());
    }

    let missing = COMMON_BROWSER_HEADERS
        .iter()
        .filter(|name| !request.has_header(name))
        .count();
    if missing >= 2 {
        reasons.push("Missing common browser headers".to_string());
    }

    let level = match reasons.len() {
        0 => ThreatLevel::Safe,
        1 | 2 => ThreatLevel::Suspicious,
        _ => ThreatLevel::Dangerous,
    };

    ThreatAssessment { level, reasons }
}
