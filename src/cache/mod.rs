//! Response cache engine
//!
//! Entries are keyed by `(host, url)`; every entry belongs to exactly one
//! host partition and partitions share no keys. Two interchangeable
//! backends implement the same contract: an in-process map store and a
//! remote adapter that delegates to the activity service over RPC.
//!
//! Expiry is lazy: `has` reports an entry only while its expiry lies
//! strictly in the future, but nothing proactively purges expired
//! entries — they linger until overwritten by a later `put`.

pub mod activity;
pub mod memory;
pub mod policy;

pub use activity::ActivityCache;
pub use memory::InMemoryCache;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::http::response::Parts;
use hyper::{StatusCode, Version};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Captured response metadata, everything needed to replay a response
/// except the body. Serialized as JSON for the RPC wire format and for
/// byte accounting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    pub reason: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    /// Capture the metadata of an upstream response.
    pub fn from_parts(parts: &Parts) -> Self {
        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: parts.status.as_u16(),
            reason: parts
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
            version: version_str(parts.version).to_string(),
            headers,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK)
    }

    /// Serialized length, the metadata half of an entry's byte cost.
    pub fn encoded_len(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// A stored response envelope with its absolute expiry (UTC).
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub meta: ResponseMeta,
    pub body: Bytes,
    pub expires: OffsetDateTime,
}

impl CachedEntry {
    /// Byte cost charged against the host partition: body length plus
    /// serialized metadata length.
    pub fn cost(&self) -> u64 {
        self.body.len() as u64 + self.meta.encoded_len()
    }
}

/// The uniform cache contract implemented by both backends.
///
/// `get` does not check expiry; callers consult `has` first. `size` is
/// used only for capacity admission decisions.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Return the stored entry for the key, expired or not.
    async fn get(&self, host: &str, url: &str) -> Option<CachedEntry>;

    /// Upsert the entry, replacing any prior value for the key.
    async fn put(
        &self,
        host: &str,
        url: &str,
        meta: ResponseMeta,
        body: Bytes,
        expires: OffsetDateTime,
    );

    /// True iff an entry exists and its expiry is strictly after now (UTC).
    async fn has(&self, host: &str, url: &str) -> bool;

    /// Current byte size of the host's partition.
    async fn size(&self, host: &str) -> u64;
}
