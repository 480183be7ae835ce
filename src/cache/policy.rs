//! Cache admission policy
//!
//! Evaluated after an upstream response body has been fully read. Path
//! rules run before size rules so policy-excluded paths never count
//! against capacity.

use time::{Duration, OffsetDateTime};

use crate::config::CachePolicy;

/// Decide whether a fetched response may be stored.
///
/// `current_size` is the host partition's present byte size as reported
/// by the backend.
pub fn should_cache(policy: &CachePolicy, path: &str, body_size: u64, current_size: u64) -> bool {
    if !policy.enabled {
        return false;
    }

    if !policy.cached.is_empty() && !path_has_suffix(path, &policy.cached) {
        return false;
    }

    if !policy.no_cached.is_empty() && path_contains(path, &policy.no_cached) {
        return false;
    }

    if body_size > policy.cache_object.max_size_bytes {
        return false;
    }

    if current_size + body_size >= policy.max_size_bytes {
        return false;
    }

    true
}

/// Absolute expiry for an entry admitted now.
pub fn expiry(policy: &CachePolicy) -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::seconds(policy.ttl_secs as i64)
}

fn path_has_suffix(path: &str, suffixes: &[String]) -> bool {
    suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
}

fn path_contains(path: &str, substrings: &[String]) -> bool {
    substrings.iter().any(|sub| path.contains(sub.as_str()))
}
