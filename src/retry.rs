//! Startup replay of uncompleted requests.
//!
//! When activity tracking is enabled, requests that were stored but
//! never marked completed (the process died mid-forward) are replayed
//! once at startup: the GET is re-issued with its recorded headers, the
//! response runs through the same admission policy, and the record is
//! marked completed. Failures are logged and skipped; replay never
//! takes a request down with it.

use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::{Method, Request, Uri};
use std::sync::Arc;

use crate::activity::{ActivityHandle, PendingRequest};
use crate::cache::{policy, ResponseCache, ResponseMeta};
use crate::config::{host_without_port, Config, DomainConfig};
use crate::proxy::pipeline::send_and_buffer;
use crate::proxy::response::empty_body;
use crate::upstream;

/// Replays pending requests recorded by the activity service.
#[derive(Clone)]
pub struct Retrier {
    config: Arc<Config>,
    cache: Arc<dyn ResponseCache>,
    activity: ActivityHandle,
}

impl Retrier {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<dyn ResponseCache>,
        activity: ActivityHandle,
    ) -> Self {
        Self {
            config,
            cache,
            activity,
        }
    }

    /// Fetch and replay everything outstanding, one task per request.
    pub async fn process_pending(&self) {
        let pending = self.activity.pending_requests().await;
        if pending.is_empty() {
            return;
        }

        tracing::info!(count = pending.len(), "Replaying uncompleted requests");

        for request in pending {
            let retrier = self.clone();
            tokio::spawn(async move {
                retrier.replay(request).await;
            });
        }
    }

    async fn replay(&self, pending: PendingRequest) {
        let uri: Uri = match pending.url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(url = %pending.url, error = %e, "Replay skipped: bad URL");
                return;
            }
        };

        let Some(authority) = uri.authority().map(|a| a.to_string()) else {
            tracing::warn!(url = %pending.url, "Replay skipped: no authority");
            return;
        };
        let tls = uri.scheme_str() == Some("https");
        let host = host_without_port(&authority).to_string();
        let path = uri.path().to_string();

        let origin_form: Uri = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .parse()
            .unwrap_or_else(|_| Uri::from_static("/"));

        let default_cfg = DomainConfig::default();
        let domain = self.config.domain(&authority).unwrap_or(&default_cfg);

        let mut builder = Request::builder().method(Method::GET).uri(origin_form);
        for (name, value) in &pending.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }
        let has_host = pending
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("host"));
        if !has_host {
            builder = builder.header(HOST, authority.as_str());
        }

        let request = match builder.body(empty_body()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(url = %pending.url, error = %e, "Replay skipped: bad headers");
                return;
            }
        };

        let mut conn = match upstream::connect(&authority, domain, tls).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(url = %pending.url, error = %e, "Replay failed: dial");
                return;
            }
        };

        let (parts, body) = match send_and_buffer(&mut conn, request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(url = %pending.url, error = %e, "Replay failed: request");
                return;
            }
        };

        let current = self.cache.size(&host).await;
        if policy::should_cache(&domain.cache, &path, body.len() as u64, current) {
            let meta = ResponseMeta::from_parts(&parts);
            let expires = policy::expiry(&domain.cache);
            self.cache.put(&host, &pending.url, meta, body, expires).await;
        }

        self.activity.mark_completed(pending.req_id).await;
        tracing::info!(url = %pending.url, "Replayed uncompleted request");
    }
}
