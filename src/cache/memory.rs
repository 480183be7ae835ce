//! In-process cache backend

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;

use super::{CachedEntry, ResponseCache, ResponseMeta};

/// One host's slice of the cache. The byte counter is maintained on every
/// put so capacity admission works from real numbers.
#[derive(Default)]
struct Partition {
    entries: HashMap<String, CachedEntry>,
    bytes: u64,
}

/// Map-based cache store guarded by a single mutex.
///
/// The coarse lock serializes all cache traffic across hosts, which is
/// acceptable because every operation is an in-memory O(1) step.
#[derive(Default)]
pub struct InMemoryCache {
    partitions: Mutex<HashMap<String, Partition>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, host: &str, url: &str) -> Option<CachedEntry> {
        let partitions = self.partitions.lock().unwrap();
        partitions.get(host).and_then(|p| p.entries.get(url)).cloned()
    }

    async fn put(
        &self,
        host: &str,
        url: &str,
        meta: ResponseMeta,
        body: Bytes,
        expires: OffsetDateTime,
    ) {
        let entry = CachedEntry { meta, body, expires };
        let cost = entry.cost();

        let mut partitions = self.partitions.lock().unwrap();
        let partition = partitions.entry(host.to_string()).or_default();

        if let Some(old) = partition.entries.insert(url.to_string(), entry) {
            partition.bytes = partition.bytes.saturating_sub(old.cost());
        }
        partition.bytes += cost;
    }

    async fn has(&self, host: &str, url: &str) -> bool {
        let partitions = self.partitions.lock().unwrap();
        match partitions.get(host).and_then(|p| p.entries.get(url)) {
            Some(entry) => entry.expires > OffsetDateTime::now_utc(),
            None => false,
        }
    }

    async fn size(&self, host: &str) -> u64 {
        let partitions = self.partitions.lock().unwrap();
        partitions.get(host).map(|p| p.bytes).unwrap_or(0)
    }
}
