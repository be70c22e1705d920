//! Best-effort client identifier from proxy headers.
//!
//! Every source here is a plain request header, so a client can choose its own
//! identifier. Nothing is validated as an IP address.

use super::request::RequestView;

/// Identifier used when no proxy header is present
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the identifier used for rate limiting and violation tracking.
///
/// Precedence: first entry of `x-forwarded-for`, then `x-real-ip`, then
/// `cf-connecting-ip`, then [`UNKNOWN_CLIENT`]. Empty values fall through.
pub fn resolve_client_identifier(request: &RequestView) -> String {
    let forwarded = request
        .header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    forwarded
        .or_else(|| request.header("x-real-ip"))
        .or_else(|| request.header("cf-connecting-ip"))
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
