//! Origin, referer and CSRF-style checks against the origin allow-list.

use super::request::RequestView;

fn origin_allowed(origin: &str, allowed_origins: &[String]) -> bool {
    allowed_origins.iter().any(|allowed| allowed == origin)
}

fn referer_allowed(referer: &str, allowed_origins: &[String]) -> bool {
    allowed_origins
        .iter()
        .any(|allowed| referer.starts_with(allowed.as_str()))
}

/// Check the request's origin context.
///
/// A request with neither `origin` nor `referer` is treated as same-origin and
/// allowed. A present `origin` must equal an allow-listed origin exactly; when
/// `origin` is absent the `referer` must start with one.
pub fn check_origin(request: &RequestView, allowed_origins: &[String]) -> bool {
    match (request.header("origin"), request.header("referer")) {
        (None, None) => true,
        (Some(origin), _) => origin_allowed(origin, allowed_origins),
        (None, Some(referer)) => referer_allowed(referer, allowed_origins),
    }
}

/// CSRF-style validation for state-changing requests.
///
/// Either the `referer` starts with an allow-listed origin or the `origin`
/// equals one. A request carrying neither fails.
pub fn validate_csrf(request: &RequestView, allowed_origins: &[String]) -> bool {
    let referer_ok = request
        .header("referer")
        .map(|referer| referer_allowed(referer, allowed_origins))
        .unwrap_or(false);
    let origin_ok = request
        .header("origin")
        .map(|origin| origin_allowed(origin, allowed_origins))
        .unwrap_or(false);
    referer_ok || origin_ok
}
