// Shared request fixtures for unit tests

use crate::core::request::RequestView;
use crate::models::GuardConfig;

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const FIREFOX_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
pub const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15";
pub const ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// A request carrying the full header set a current Chromium browser sends
pub fn browser_request(method: &str) -> RequestView {
    let req = RequestView::new(method, "http://localhost:3000/api/contact")
        .with_header("user-agent", CHROME_UA)
        .with_header(
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .with_header("accept-language", "en-US,en;q=0.9")
        .with_header("accept-encoding", "gzip, deflate, br")
        .with_header("connection", "keep-alive")
        .with_header("origin", ALLOWED_ORIGIN)
        .with_header("sec-fetch-site", "same-origin")
        .with_header("sec-fetch-mode", "cors")
        .with_header("sec-fetch-dest", "empty")
        .with_header("sec-ch-ua", "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\"")
        .with_header("sec-ch-ua-mobile", "?0")
        .with_header("sec-ch-ua-platform", "\"Windows\"");

    if req.has_body() {
        req.with_header("content-type", "application/json")
    } else {
        req
    }
}

/// `browser_request` coming from a given client address
pub fn browser_request_from(method: &str, client: &str) -> RequestView {
    browser_request(method).with_header("x-forwarded-for", client)
}

/// Headers Firefox and Safari send: fetch metadata but no client hints
pub fn hintless_browser_request(method: &str, user_agent: &str, client: &str) -> RequestView {
    let req = RequestView::new(method, "http://localhost:3000/api/contact")
        .with_header("x-forwarded-for", client)
        .with_header("user-agent", user_agent)
        .with_header(
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .with_header("accept-language", "en-US,en;q=0.5")
        .with_header("accept-encoding", "gzip, deflate, br")
        .with_header("connection", "keep-alive")
        .with_header("origin", ALLOWED_ORIGIN)
        .with_header("sec-fetch-site", "same-origin")
        .with_header("sec-fetch-mode", "cors")
        .with_header("sec-fetch-dest", "empty");

    if req.has_body() {
        req.with_header("content-type", "application/json")
    } else {
        req
    }
}

/// Guard configuration with the default allow-list and limits
pub fn guard_config() -> GuardConfig {
    GuardConfig::default()
}
