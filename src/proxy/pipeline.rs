//! The per-request proxy pipeline.
//!
//! Stateless across requests apart from the shared cache, pool and
//! activity handles. Every inbound request resolves its domain
//! configuration by Host, gets a clean outbound rewrite, and either
//! serves from cache (GET, policy enabled, fresh entry) or forwards
//! upstream with write-through admission.

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use hyper::http::response::Parts;
use hyper::{Method, Request, Response, Uri};
use std::sync::Arc;

use super::headers::{apply_browser_cache_policy, sanitize_response_headers, strip_proxy_headers};
use super::response::{full_body, upstream_error_response, ProxyBody};
use crate::activity::ActivityHandle;
use crate::cache::{policy, CachedEntry, ResponseCache, ResponseMeta};
use crate::config::{host_without_port, BrowserCachePolicy, Config, DomainConfig};
use crate::error::{Error, Result};
use crate::upstream::{self, ConnectionPool, OutboundBody};

/// Request handler shared by all connections of one listener.
pub struct Pipeline {
    config: Arc<Config>,
    cache: Arc<dyn ResponseCache>,
    pool: ConnectionPool,
    activity: Option<ActivityHandle>,
    /// True on the interception listener; also selects TLS upstream dials.
    tls_enabled: bool,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, cache: Arc<dyn ResponseCache>, tls_enabled: bool) -> Self {
        Self {
            config,
            cache,
            pool: ConnectionPool::new(),
            activity: None,
            tls_enabled,
        }
    }

    /// Enable request-lifecycle tracking against the activity service.
    pub fn with_activity(mut self, activity: Option<ActivityHandle>) -> Self {
        self.activity = activity;
        self
    }

    /// Handle one inbound request. Infallible: every failure path maps
    /// to a well-formed error response.
    pub async fn handle(self: Arc<Self>, req: Request<Incoming>) -> Response<ProxyBody> {
        let scheme = if self.tls_enabled { "https" } else { "http" };

        let authority = req
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| req.uri().authority().map(|a| a.to_string()))
            .unwrap_or_default();
        let host = host_without_port(&authority).to_string();

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let url = format!("{}://{}{}", scheme, host, path_and_query);

        tracing::debug!(method = %req.method(), url = %url, "Incoming request");

        // Unconfigured hosts are forwarded best-effort with an empty
        // policy, never rejected outright.
        let default_cfg = DomainConfig::default();
        let domain = self.config.domain(&authority).unwrap_or(&default_cfg);

        if req.method() == Method::GET {
            self.handle_cached(req, domain, &host, &authority, &url).await
        } else {
            self.handle_forward(req, domain, &authority, &url).await
        }
    }

    /// GET branch: consult the cache, else forward and write through.
    async fn handle_cached(
        &self,
        req: Request<Incoming>,
        domain: &DomainConfig,
        host: &str,
        authority: &str,
        url: &str,
    ) -> Response<ProxyBody> {
        let cache_cfg = &domain.cache;
        let browser_cfg = &domain.browser_cache;

        if cache_cfg.enabled && self.cache.has(host, url).await {
            if let Some(entry) = self.cache.get(host, url).await {
                tracing::info!(url = %url, bytes = entry.body.len(), "From cache");
                return cached_response(&entry, browser_cfg);
            }
        }

        let path = req.uri().path().to_string();

        // Record the outstanding request so the external retrier can
        // replay it if this process dies mid-forward.
        let mut req_id = None;
        if let Some(activity) = &self.activity {
            let headers = header_pairs(req.headers());
            req_id = activity.store_request(url, &headers).await;
        }

        let (parts, body) = match self.forward(req, domain, authority).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Request error");
                return upstream_error_response(&e.to_string());
            }
        };

        if let (Some(activity), Some(id)) = (&self.activity, req_id) {
            activity.mark_completed(id).await;
        }

        let current = self.cache.size(host).await;
        if policy::should_cache(cache_cfg, &path, body.len() as u64, current) {
            let meta = ResponseMeta::from_parts(&parts);
            let expires = policy::expiry(cache_cfg);
            self.cache
                .put(host, url, meta, body.clone(), expires)
                .await;
            tracing::debug!(url = %url, bytes = body.len(), "Cached response");
        }

        let mut response = Response::new(full_body(body));
        *response.status_mut() = parts.status;
        *response.headers_mut() = parts.headers;
        apply_browser_cache_policy(response.headers_mut(), browser_cfg);
        response
    }

    /// Non-GET branch: always bypasses the cache.
    async fn handle_forward(
        &self,
        req: Request<Incoming>,
        domain: &DomainConfig,
        authority: &str,
        url: &str,
    ) -> Response<ProxyBody> {
        let (parts, body) = match self.forward(req, domain, authority).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Request error");
                return upstream_error_response(&e.to_string());
            }
        };

        let mut response = Response::new(full_body(body));
        *response.status_mut() = parts.status;
        *response.headers_mut() = parts.headers;
        response
    }

    /// Dial (or borrow) an upstream connection, send the cleaned request
    /// and buffer the full response.
    async fn forward<B>(
        &self,
        req: Request<B>,
        domain: &DomainConfig,
        authority: &str,
    ) -> Result<(Parts, Bytes)>
    where
        B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
    {
        let outbound = clean_outbound(req, authority)?;
        let pooled = domain.max_connections > 0;

        let mut conn = if pooled {
            self.pool.get(authority, domain, self.tls_enabled).await?
        } else {
            upstream::connect(authority, domain, self.tls_enabled).await?
        };

        let result = send_and_buffer(&mut conn, outbound).await;

        if pooled {
            self.pool.put(authority, conn);
        }

        result
    }
}

pub(crate) async fn send_and_buffer(
    conn: &mut upstream::UpstreamConn,
    outbound: Request<OutboundBody>,
) -> Result<(Parts, Bytes)> {
    conn.ready()
        .await
        .map_err(|e| Error::upstream(format!("upstream connection unusable: {}", e)))?;

    let response = conn
        .send_request(outbound)
        .await
        .map_err(|e| Error::upstream(format!("upstream request failed: {}", e)))?;

    let (mut parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| Error::upstream(format!("upstream body error: {}", e)))?
        .to_bytes();

    // The body is re-framed from the buffer, so connection-level
    // headers from the origin no longer describe it.
    sanitize_response_headers(&mut parts.headers);

    Ok((parts, bytes))
}

/// Produce the clean outbound request: origin-form URI, hop-by-hop and
/// proxy headers stripped, Host guaranteed.
fn clean_outbound<B>(req: Request<B>, authority: &str) -> Result<Request<OutboundBody>>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let (mut parts, body) = req.into_parts();

    strip_proxy_headers(&mut parts.headers);

    let origin_form: Uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .parse()
        .map_err(|e| Error::proxy(format!("invalid request path: {}", e)))?;

    let mut builder = Request::builder().method(parts.method).uri(origin_form);

    for (name, value) in parts.headers.iter() {
        builder = builder.header(name, value);
    }

    if !parts.headers.contains_key(HOST) && !authority.is_empty() {
        builder = builder.header(HOST, authority);
    }

    builder
        .body(body.boxed())
        .map_err(|e| Error::proxy(format!("cannot rebuild request: {}", e)))
}

/// Reconstruct an HTTP response from a stored envelope.
fn cached_response(entry: &CachedEntry, browser_cfg: &BrowserCachePolicy) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(entry.body.clone()));
    *response.status_mut() = entry.meta.status_code();

    let headers = response.headers_mut();
    for (name, value) in &entry.meta.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        headers.append(name, value);
    }

    apply_browser_cache_policy(headers, browser_cfg);
    response
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
