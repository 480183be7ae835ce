//! Test infrastructure for e2e proxy tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use propylon::cache::{CachedEntry, InMemoryCache, ResponseCache, ResponseMeta};
use propylon::{CertStore, Config, GeneratedAuthority, ProxyServer, RootAuthority};
use rustls::pki_types::PrivateKeyDer;
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

// ---------------------------------------------------------------------------
// TestAuthority — root CA material for one test
// ---------------------------------------------------------------------------

/// A generated root CA with a tempdir for the per-host certificate store.
pub struct TestAuthority {
    pub cert_pem: String,
    pub key_pem: String,
    pub dir: TempDir,
}

impl TestAuthority {
    pub fn generate() -> Self {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let generated = GeneratedAuthority::generate().unwrap();
        Self {
            cert_pem: generated.cert_pem,
            key_pem: generated.key_pem,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// A certificate store rooted in this CA, persisting under the tempdir.
    pub fn cert_store(&self) -> Arc<CertStore> {
        let authority = RootAuthority::from_pem(&self.cert_pem, &self.key_pem).unwrap();
        Arc::new(CertStore::new(authority, self.certs_dir()))
    }

    pub fn certs_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("certs")
    }

    /// An HTTPS client that trusts this CA and resolves `host` to
    /// 127.0.0.1 (the URL port selects the listener).
    pub fn intercept_client(&self, host: &str) -> reqwest::Client {
        reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(self.cert_pem.as_bytes()).unwrap())
            .resolve(host, "127.0.0.1:0".parse().unwrap())
            .build()
            .unwrap()
    }
}

/// A plain-HTTP client resolving `host` to 127.0.0.1.
pub fn plain_client(host: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .resolve(host, "127.0.0.1:0".parse().unwrap())
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// TestProxy — bind + spawn a ProxyServer
// ---------------------------------------------------------------------------

pub struct TestProxy {
    pub http_addr: SocketAddr,
    pub https_addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestProxy {
    /// Start a proxy from a JSON config string with the given cache
    /// backend and certificate store. Listens on ephemeral ports.
    pub async fn start(
        config_json: &str,
        cache: Arc<dyn ResponseCache>,
        cert_store: Arc<CertStore>,
    ) -> Self {
        let config = Config::parse(config_json).unwrap();
        let mut server =
            ProxyServer::new(config, cache, cert_store, "127.0.0.1:0", "127.0.0.1:0");
        let (http_addr, https_addr) = server.bind().await.unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = server.serve(shutdown_rx).await;
        });

        Self {
            http_addr,
            https_addr,
            shutdown_tx,
        }
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

// ---------------------------------------------------------------------------
// TlsUpstream — a counting HTTPS origin
// ---------------------------------------------------------------------------

/// A TLS upstream with a request counter. Its certificate is
/// self-provisioned; the proxy dials upstream without verification.
pub struct TlsUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TlsUpstream {
    pub async fn start(status: u16, content_type: &'static str, body: &'static str) -> Self {
        let generated = GeneratedAuthority::generate().unwrap();
        let authority = RootAuthority::from_pem(&generated.cert_pem, &generated.key_pem).unwrap();
        let issued = authority.issue_for_host("upstream.test").unwrap();

        let certs = rustls_pemfile::certs(&mut issued.cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut issued.key_pem.as_bytes())
            .unwrap()
            .unwrap();

        let mut server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .unwrap();
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let task_hits = hits.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        let (stream, _) = match result {
                            Ok(conn) => conn,
                            Err(_) => continue,
                        };

                        let acceptor = acceptor.clone();
                        let hits = task_hits.clone();

                        tokio::spawn(async move {
                            let tls_stream = match acceptor.accept(stream).await {
                                Ok(s) => s,
                                Err(_) => return,
                            };
                            let io = TokioIo::new(tls_stream);

                            let service = service_fn(move |_req: Request<Incoming>| {
                                hits.fetch_add(1, Ordering::SeqCst);
                                async move {
                                    Ok::<_, hyper::Error>(
                                        Response::builder()
                                            .status(StatusCode::from_u16(status).unwrap())
                                            .header("Content-Type", content_type)
                                            .body(
                                                Full::new(Bytes::from_static(body.as_bytes()))
                                                    .map_err(|e: std::convert::Infallible| -> std::convert::Infallible { match e {} })
                                                    .boxed(),
                                            )
                                            .unwrap(),
                                    )
                                }
                            });

                            let _ = http1::Builder::new().serve_connection(io, service).await;
                        });
                    }
                }
            }
        });

        Self {
            addr,
            hits,
            shutdown_tx,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

// ---------------------------------------------------------------------------
// CountingCache — call-count instrumentation over the in-memory backend
// ---------------------------------------------------------------------------

pub struct CountingCache {
    inner: InMemoryCache,
    pub get_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
    pub has_calls: AtomicUsize,
}

impl CountingCache {
    pub fn new() -> Self {
        Self {
            inner: InMemoryCache::new(),
            get_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            has_calls: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn hases(&self) -> usize {
        self.has_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseCache for CountingCache {
    async fn get(&self, host: &str, url: &str) -> Option<CachedEntry> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(host, url).await
    }

    async fn put(
        &self,
        host: &str,
        url: &str,
        meta: ResponseMeta,
        body: Bytes,
        expires: OffsetDateTime,
    ) {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.put(host, url, meta, body, expires).await
    }

    async fn has(&self, host: &str, url: &str) -> bool {
        self.has_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.has(host, url).await
    }

    async fn size(&self, host: &str) -> u64 {
        self.inner.size(host).await
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// A domain config JSON with caching and browser-cache both enabled.
pub fn cached_domain_json(host: &str, upstream: SocketAddr) -> String {
    format!(
        r#"{{
            "domains": {{
                "{host}": {{
                    "ip": "{upstream}",
                    "timeout": 5,
                    "browser_cache": {{"enabled": false, "ttl": 0, "ttl_units": "s"}},
                    "cache": {{
                        "enabled": true,
                        "ttl": 60,
                        "ttl_units": "s",
                        "max_size": 10,
                        "size_units": "mb",
                        "cache_object": {{"max_size": 1, "size_units": "mb"}}
                    }}
                }}
            }}
        }}"#
    )
}

pub type UpstreamBody = BoxBody<Bytes, hyper::Error>;
