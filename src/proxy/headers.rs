//! Header rewriting for requests and responses.

use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL, DATE};

use crate::config::BrowserCachePolicy;

/// Hop-by-hop / proxy-specific request headers that must not reach the
/// upstream (RFC 7230 §6.1 plus the de-facto Proxy-Connection).
const PROXY_HEADERS: &[&str] = &[
    "proxy-connection",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Connection-level response headers that no longer apply once the body
/// has been buffered and re-framed.
const RESPONSE_CONNECTION_HEADERS: &[&str] = &["connection", "keep-alive", "transfer-encoding"];

/// Strip hop-by-hop and proxy-specific headers from an outbound request.
pub fn strip_proxy_headers(headers: &mut HeaderMap) {
    for name in PROXY_HEADERS {
        headers.remove(*name);
    }
}

/// Drop connection-level headers from a buffered upstream response.
pub fn sanitize_response_headers(headers: &mut HeaderMap) {
    for name in RESPONSE_CONNECTION_HEADERS {
        headers.remove(*name);
    }
}

/// GET-path response post-processing: drop `Date` so a cache-served
/// response does not masquerade as fresh, then rewrite `Cache-Control`
/// per the domain's browser-cache policy.
pub fn apply_browser_cache_policy(headers: &mut HeaderMap, policy: &BrowserCachePolicy) {
    headers.remove(DATE);

    if policy.enabled {
        let directive = format!("public, max-age={}", policy.ttl_secs);
        match HeaderValue::from_str(&directive) {
            Ok(value) => {
                headers.insert(CACHE_CONTROL, value);
            }
            Err(_) => {
                headers.remove(CACHE_CONTROL);
            }
        }
    } else {
        headers.remove(CACHE_CONTROL);
    }
}
