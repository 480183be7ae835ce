//! Client wrapper for the external activity service.
//!
//! The activity service is a remote store that records outstanding
//! requests and persisted responses; the proxy must stay available when
//! it is unreachable, so every call here is bounded by a timeout and
//! failures are logged and swallowed rather than propagated to the
//! HTTP response path.

pub mod proto;

use bytes::Bytes;
use std::time::Duration;
use time::OffsetDateTime;
use tonic::transport::Channel;

use crate::cache::{CachedEntry, ResponseMeta};
use crate::error::{Error, Result};
use proto::activity_client::ActivityClient;

/// Upper bound applied to every RPC; a slow activity service must not
/// stall request handling.
const RPC_TIMEOUT: Duration = Duration::from_secs(2);

/// A request that was stored but never marked completed.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub req_id: i32,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Shared handle to the activity service.
#[derive(Clone)]
pub struct ActivityHandle {
    client: ActivityClient<Channel>,
    timeout: Duration,
}

impl ActivityHandle {
    /// Connect to the activity service at `addr` (host:port or full URI).
    pub async fn connect(addr: &str) -> Result<Self> {
        let endpoint = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };

        let client = ActivityClient::connect(endpoint)
            .await
            .map_err(|e| Error::activity(format!("cannot reach activity service '{}': {}", addr, e)))?;

        Ok(Self {
            client,
            timeout: RPC_TIMEOUT,
        })
    }

    /// Record a request before it is forwarded. Returns the assigned id,
    /// or `None` if the service is unavailable.
    pub async fn store_request(&self, url: &str, headers: &[(String, String)]) -> Option<i32> {
        let payload = proto::ReqRequest {
            req_id: 0,
            url: url.to_string(),
            header: serde_json::to_vec(headers).unwrap_or_default(),
            completed: false,
        };

        let mut client = self.client.clone();
        match tokio::time::timeout(self.timeout, client.store_request(payload)).await {
            Ok(Ok(reply)) => Some(reply.into_inner().req_id),
            Ok(Err(status)) => {
                tracing::warn!(error = %status, "store_request failed");
                None
            }
            Err(_) => {
                tracing::warn!("store_request timed out");
                None
            }
        }
    }

    /// Mark a stored request as completed.
    pub async fn mark_completed(&self, req_id: i32) {
        let payload = proto::ReqRequest {
            req_id,
            url: String::new(),
            header: Vec::new(),
            completed: true,
        };

        let mut client = self.client.clone();
        match tokio::time::timeout(self.timeout, client.update_request(payload)).await {
            Ok(Ok(_)) => {}
            Ok(Err(status)) => tracing::warn!(req_id, error = %status, "mark_completed failed"),
            Err(_) => tracing::warn!(req_id, "mark_completed timed out"),
        }
    }

    /// Fetch the requests that started but never completed.
    pub async fn pending_requests(&self) -> Vec<PendingRequest> {
        let mut client = self.client.clone();
        let reply = match tokio::time::timeout(self.timeout, client.get_requests(proto::Empty {})).await
        {
            Ok(Ok(reply)) => reply.into_inner(),
            Ok(Err(status)) => {
                tracing::warn!(error = %status, "get_requests failed");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!("get_requests timed out");
                return Vec::new();
            }
        };

        reply
            .requests
            .into_iter()
            .map(|req| PendingRequest {
                req_id: req.req_id,
                url: req.url,
                headers: serde_json::from_slice(&req.header).unwrap_or_default(),
            })
            .collect()
    }

    /// Persist a response envelope.
    pub async fn store_response(
        &self,
        host: &str,
        url: &str,
        meta: &ResponseMeta,
        body: &Bytes,
        expires: OffsetDateTime,
    ) {
        let payload = proto::ResRequest {
            host: host.to_string(),
            url: url.to_string(),
            body: body.to_vec(),
            response: serde_json::to_vec(meta).unwrap_or_default(),
            expires: Some(to_timestamp(expires)),
        };

        let mut client = self.client.clone();
        match tokio::time::timeout(self.timeout, client.store_response(payload)).await {
            Ok(Ok(_)) => {}
            Ok(Err(status)) => tracing::warn!(host, url, error = %status, "store_response failed"),
            Err(_) => tracing::warn!(host, url, "store_response timed out"),
        }
    }

    /// Fetch a persisted response envelope, or `None` on miss or error.
    pub async fn get_response(&self, host: &str, url: &str) -> Option<CachedEntry> {
        let payload = proto::GetResRequest {
            host: host.to_string(),
            url: url.to_string(),
        };

        let mut client = self.client.clone();
        let reply = match tokio::time::timeout(self.timeout, client.get_response(payload)).await {
            Ok(Ok(reply)) => reply.into_inner(),
            Ok(Err(status)) => {
                tracing::debug!(host, url, error = %status, "get_response miss");
                return None;
            }
            Err(_) => {
                tracing::warn!(host, url, "get_response timed out");
                return None;
            }
        };

        let meta: ResponseMeta = serde_json::from_slice(&reply.response).ok()?;
        let expires = reply.expires.map(from_timestamp)?;

        Some(CachedEntry {
            meta,
            body: Bytes::from(reply.body),
            expires,
        })
    }

    /// Current byte size of a host's persisted partition.
    pub async fn host_size(&self, host: &str) -> Option<u64> {
        let payload = proto::HostSizeRequest {
            host: host.to_string(),
        };

        let mut client = self.client.clone();
        match tokio::time::timeout(self.timeout, client.get_host_size(payload)).await {
            Ok(Ok(reply)) => Some(reply.into_inner().size.max(0) as u64),
            Ok(Err(status)) => {
                tracing::warn!(host, error = %status, "get_host_size failed");
                None
            }
            Err(_) => {
                tracing::warn!(host, "get_host_size timed out");
                None
            }
        }
    }
}

fn to_timestamp(when: OffsetDateTime) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: when.unix_timestamp(),
        nanos: when.nanosecond() as i32,
    }
}

fn from_timestamp(ts: prost_types::Timestamp) -> OffsetDateTime {
    let base = OffsetDateTime::from_unix_timestamp(ts.seconds)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    base + time::Duration::nanoseconds(ts.nanos as i64)
}
