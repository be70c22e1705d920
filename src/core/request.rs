//! Read-only view of an inbound request.
//!
//! The guard never sees framework types directly. The HTTP layer copies the
//! method, URL and headers into a `RequestView`, and every check reads from it.

use std::collections::HashMap;

const MUTATING_METHODS: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];
const BODY_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// Method, URL and a case-insensitive header map
#[derive(Debug, Clone, Default)]
pub struct RequestView {
    method: String,
    url: String,
    headers: HashMap<String, String>,
}

impl RequestView {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Builder-style header insertion
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Insert a header; repeated names are joined with ", "
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    /// Header value by name, ignoring case. Empty values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// User-agent, or the empty string
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    /// Methods that change server state and need CSRF validation
    pub fn is_mutating(&self) -> bool {
        MUTATING_METHODS.contains(&self.method.as_str())
    }

    /// Methods that carry a request body
    pub fn has_body(&self) -> bool {
        BODY_METHODS.contains(&self.method.as_str())
    }
}
