mod common;

use common::{TestAuthority, TestProxy, TlsUpstream};
use propylon::InMemoryCache;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// TLS interception e2e tests
// ---------------------------------------------------------------------------

fn intercept_config(host: &str, upstream: std::net::SocketAddr) -> String {
    format!(
        r#"{{
            "domains": {{
                "{host}": {{
                    "ip": "{upstream}",
                    "timeout": 5,
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

/// The proxy terminates TLS with a generated certificate the client
/// trusts via the root CA, forwards to the TLS upstream, and serves the
/// repeat GET from cache.
#[tokio::test]
async fn test_tls_interception_and_caching() {
    let ca = TestAuthority::generate();
    let upstream = TlsUpstream::start(200, "application/json", r#"{"ok":true}"#).await;

    let config = intercept_config("secure.example", upstream.addr);
    let proxy = TestProxy::start(&config, Arc::new(InMemoryCache::new()), ca.cert_store()).await;

    let client = ca.intercept_client("secure.example");
    let url = format!("https://secure.example:{}/data.json", proxy.https_addr.port());

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.text().await.unwrap(), r#"{"ok":true}"#);

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.text().await.unwrap(), r#"{"ok":true}"#);

    assert_eq!(upstream.hits(), 1, "second GET must come from the cache");

    upstream.shutdown();
    proxy.shutdown();
}

/// Serving a hostname persists its certificate pair under the certs
/// directory for reuse across restarts.
#[tokio::test]
async fn test_certificate_persisted_per_host() {
    let ca = TestAuthority::generate();
    let upstream = TlsUpstream::start(200, "text/plain", "hello").await;

    let config = intercept_config("persist.example", upstream.addr);
    let proxy = TestProxy::start(&config, Arc::new(InMemoryCache::new()), ca.cert_store()).await;

    let client = ca.intercept_client("persist.example");
    let url = format!("https://persist.example:{}/", proxy.https_addr.port());
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let certs_dir = ca.certs_dir();
    assert!(certs_dir.join("persist.example.pem").exists());
    assert!(certs_dir.join("persist.example.key").exists());

    upstream.shutdown();
    proxy.shutdown();
}

/// A POST over the interception listener reaches the TLS upstream and
/// never enters the cache.
#[tokio::test]
async fn test_tls_post_forwarded() {
    let ca = TestAuthority::generate();
    let upstream = TlsUpstream::start(201, "text/plain", "created").await;

    let config = intercept_config("api.example", upstream.addr);
    let proxy = TestProxy::start(&config, Arc::new(InMemoryCache::new()), ca.cert_store()).await;

    let client = ca.intercept_client("api.example");
    let url = format!("https://api.example:{}/items", proxy.https_addr.port());

    for _ in 0..2 {
        let resp = client.post(&url).body("item").send().await.unwrap();
        assert_eq!(resp.status(), 201);
    }

    assert_eq!(upstream.hits(), 2, "POSTs always reach upstream");

    upstream.shutdown();
    proxy.shutdown();
}
