//! Header checks run after classification and origin validation.

use super::request::RequestView;
use crate::models::HeaderPolicyConfig;

/// Secondary user-agent check; false when the request should be blocked.
///
/// An empty user-agent fails, as does one containing a deny-listed or
/// suspicious substring.
pub fn check_user_agent(request: &RequestView, policy: &HeaderPolicyConfig) -> bool {
    let user_agent = request.user_agent().to_lowercase();
    if user_agent.is_empty() {
        return false;
    }
    !policy
        .blocked_user_agents
        .iter()
        .chain(policy.suspicious_user_agents.iter())
        .any(|blocked| user_agent.contains(&blocked.to_lowercase()))
}

/// Every required header is present; body headers only for methods with a body
pub fn validate_headers(request: &RequestView, policy: &HeaderPolicyConfig) -> bool {
    let always = policy.required_headers.iter();
    let body = policy
        .required_body_headers
        .iter()
        .filter(|_| request.has_body());
    always.chain(body).all(|name| request.has_header(name))
}

/// Whether the request looks like it came from a real browser.
///
/// Needs all of: an `accept` a browser would send, at least one of
/// `accept-language` / compression in `accept-encoding` / `connection:
/// keep-alive`, and a long user-agent with a parenthesised platform section
/// and a known browser token.
pub fn looks_like_browser(request: &RequestView, policy: &HeaderPolicyConfig) -> bool {
    let accept = request.header("accept").unwrap_or("");
    let browser_accept = ["text/html", "application/json", "application/xhtml+xml", "*/*"]
        .iter()
        .any(|media| accept.contains(media));

    let has_language = request.has_header("accept-language");
    let has_encoding = request
        .header("accept-encoding")
        .map(|value| {
            let value = value.to_lowercase();
            value.contains("gzip") || value.contains("deflate") || value.contains("br")
        })
        .unwrap_or(false);
    let keep_alive = request
        .header("connection")
        .map(|value| value.to_lowercase().contains("keep-alive"))
        .unwrap_or(false);

    let user_agent = request.user_agent();
    let lowered = user_agent.to_lowercase();
    let browser_user_agent = user_agent.chars().count() >= policy.min_browser_user_agent_length
        && user_agent.contains('(')
        && user_agent.contains(')')
        && policy
            .browser_indicators
            .iter()
            .any(|token| lowered.contains(&token.to_lowercase()));

    browser_accept && (has_language || has_encoding || keep_alive) && browser_user_agent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{browser_request, CHROME_UA};

    #[test]
    fn empty_and_listed_user_agents_fail() {
        let policy = HeaderPolicyConfig::default();
        assert!(!check_user_agent(&RequestView::new("GET", "/"), &policy));

        let curl = RequestView::new("GET", "/").with_header("user-agent", "curl/8.0");
        assert!(!check_user_agent(&curl, &policy));

        let monitor =
            RequestView::new("GET", "/").with_header("user-agent", "UptimeMonitor 2.0 (x)");
        assert!(!check_user_agent(&monitor, &policy));

        assert!(check_user_agent(&browser_request("GET"), &policy));
    }

    #[test]
    fn content_type_required_only_with_body() {
        let policy = HeaderPolicyConfig::default();
        let get = browser_request("GET");
        assert!(validate_headers(&get, &policy));

        let post = browser_request("POST");
        assert!(validate_headers(&post, &policy));

        let post_without_type = RequestView::new("POST", "/api/contact")
            .with_header("user-agent", CHROME_UA)
            .with_header("accept", "application/json");
        assert!(!validate_headers(&post_without_type, &policy));

        let no_accept = RequestView::new("GET", "/").with_header("user-agent", CHROME_UA);
        assert!(!validate_headers(&no_accept, &policy));
    }

    #[test]
    fn browser_shape_is_required() {
        let policy = HeaderPolicyConfig::default();
        assert!(looks_like_browser(&browser_request("GET"), &policy));

        let json_only = RequestView::new("GET", "/")
            .with_header("user-agent", CHROME_UA)
            .with_header("accept", "application/json");
        assert!(!looks_like_browser(&json_only, &policy), "needs language, encoding or keep-alive");

        let short_agent = RequestView::new("GET", "/")
            .with_header("user-agent", "Mozilla/5.0 (X11)")
            .with_header("accept", "text/html")
            .with_header("accept-language", "en");
        assert!(!looks_like_browser(&short_agent, &policy));

        let no_parens = RequestView::new("GET", "/")
            .with_header(
                "user-agent",
                "Mozilla/5.0 AppleWebKit/537.36 KHTML like Gecko Chrome/120 Safari/537.36",
            )
            .with_header("accept", "text/html")
            .with_header("connection", "keep-alive");
        assert!(!looks_like_browser(&no_parens, &policy));
    }
}
