//! Header signals read once per request.

use super::request::RequestView;
use crate::models::ClassifierConfig;

pub const FETCH_METADATA_HEADERS: [&str; 3] =
    ["sec-fetch-site", "sec-fetch-mode", "sec-fetch-dest"];
pub const CLIENT_HINT_HEADERS: [&str; 3] = ["sec-ch-ua", "sec-ch-ua-mobile", "sec-ch-ua-platform"];

/// Snapshot of everything the classifier looks at
#[derive(Debug, Clone, Default)]
pub struct RequestSignals {
    pub method: String,
    pub user_agent: Option<String>,
    /// Lowercased user-agent, empty when missing
    pub user_agent_lower: String,
    pub accept: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub connection: Option<String>,
    pub origin: Option<String>,
    pub referer: Option<String>,
    /// Fetch-metadata headers that were absent
    pub missing_fetch_metadata: Vec<&'static str>,
    /// Client-hint headers that were absent
    pub missing_client_hints: Vec<&'static str>,
    /// Tool-vendor headers that were present
    pub tool_headers_present: Vec<String>,
    /// The user-agent says it is a crawler
    pub self_identified_crawler: bool,
}

impl RequestSignals {
    pub fn extract(request: &RequestView, config: &ClassifierConfig) -> Self {
        let owned = |name: &str| request.header(name).map(str::to_string);
        let user_agent = owned("user-agent");
        let user_agent_lower = user_agent
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();

        let self_identified_crawler = config
            .crawler_markers
            .iter()
            .any(|marker| user_agent_lower.contains(&marker.to_lowercase()));

        let missing = |names: &[&'static str]| {
            names
                .iter()
                .copied()
                .filter(|name| !request.has_header(name))
                .collect::<Vec<_>>()
        };

        let tool_headers_present = config
            .tool_headers
            .iter()
            .filter(|name| request.has_header(name))
            .cloned()
            .collect();

        Self {
            method: request.method().to_string(),
            user_agent,
            user_agent_lower,
            accept: owned("accept"),
            accept_language: owned("accept-language"),
            accept_encoding: owned("accept-encoding"),
            connection: owned("connection"),
            origin: owned("origin"),
            referer: owned("referer"),
            missing_fetch_metadata: missing(&FETCH_METADATA_HEADERS),
            missing_client_hints: missing(&CLIENT_HINT_HEADERS),
            tool_headers_present,
            self_identified_crawler,
        }
    }

    pub fn is_missing_fetch_metadata(&self, header: &str) -> bool {
        self.missing_fetch_metadata.iter().any(|h| *h == header)
    }

    pub fn is_missing_client_hint(&self, header: &str) -> bool {
        self.missing_client_hints.iter().any(|h| *h == header)
    }
}
