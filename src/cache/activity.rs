//! Remote cache backend delegating to the activity service.
//!
//! Each operation is one RPC. The handle bounds every call with a
//! timeout, so a dead activity service degrades `has`/`get` to cache
//! misses and `put` to a dropped write instead of blocking or failing
//! the request being handled.

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use super::{CachedEntry, ResponseCache, ResponseMeta};
use crate::activity::ActivityHandle;

/// Cache backend persisted by the activity service.
pub struct ActivityCache {
    handle: ActivityHandle,
}

impl ActivityCache {
    pub fn new(handle: ActivityHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl ResponseCache for ActivityCache {
    async fn get(&self, host: &str, url: &str) -> Option<CachedEntry> {
        self.handle.get_response(host, url).await
    }

    async fn put(
        &self,
        host: &str,
        url: &str,
        meta: ResponseMeta,
        body: Bytes,
        expires: OffsetDateTime,
    ) {
        self.handle
            .store_response(host, url, &meta, &body, expires)
            .await;
    }

    async fn has(&self, host: &str, url: &str) -> bool {
        match self.handle.get_response(host, url).await {
            Some(entry) => entry.expires > OffsetDateTime::now_utc(),
            None => false,
        }
    }

    async fn size(&self, host: &str) -> u64 {
        // An unreachable service reports zero; admission then decides on
        // body size alone and the subsequent put is dropped anyway.
        self.handle.host_size(host).await.unwrap_or(0)
    }
}
