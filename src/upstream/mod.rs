//! Upstream connection and transport layer.
//!
//! Dials a domain's configured upstream (TCP or TLS) applying the
//! domain's dial timeout and keep-alive, then performs the HTTP/1.1
//! client handshake. The TLS mode skips server-certificate
//! verification: the proxy trusts its own routing configuration, not
//! the origin's chain, since it already terminates the inbound side.

pub mod pool;

pub use pool::ConnectionPool;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::TlsConnector;

use crate::config::{host_without_port, DomainConfig};
use crate::error::{Error, Result};

/// Body type for outbound requests.
pub type OutboundBody = BoxBody<Bytes, hyper::Error>;

/// An established upstream HTTP/1.1 connection handle.
pub type UpstreamConn = SendRequest<OutboundBody>;

/// Dial the upstream for `authority` per the domain configuration and
/// hand back a ready HTTP/1.1 connection. Used once per request in the
/// simple path; the pool wraps this for the pooled variant.
pub async fn connect(authority: &str, cfg: &DomainConfig, tls: bool) -> Result<UpstreamConn> {
    let default_port = if tls { 443 } else { 80 };
    let stream = dial_tcp(authority, cfg, default_port).await?;

    if tls {
        let host = host_without_port(authority);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::upstream(format!("Invalid server name '{}': {}", host, e)))?;

        let connector = TlsConnector::from(insecure_client_config());
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| Error::tls(format!("TLS connection to {} failed: {}", authority, e)))?;

        handshake(tls_stream).await
    } else {
        handshake(stream).await
    }
}

/// HTTP/1.1 client handshake; the connection driver runs in its own task.
async fn handshake<S>(stream: S) -> Result<UpstreamConn>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (sender, conn) = hyper::client::conn::http1::handshake::<_, OutboundBody>(io)
        .await
        .map_err(|e| Error::upstream(format!("HTTP handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            let err_str = e.to_string();
            if !err_str.contains("connection closed") && !err_str.contains("early eof") {
                tracing::debug!(error = %e, "Upstream connection error");
            }
        }
    });

    Ok(sender)
}

/// Dial TCP to the configured upstream address, falling back to DNS on
/// the authority itself for unconfigured hosts.
async fn dial_tcp(authority: &str, cfg: &DomainConfig, default_port: u16) -> Result<TcpStream> {
    let addr = resolve_addr(authority, cfg, default_port).await?;

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(Error::Io)?;

    if cfg.keep_alive > 0 {
        // Interval granularity is left to the OS.
        socket.set_keepalive(true).map_err(Error::Io)?;
    }

    let connect = socket.connect(addr);
    let stream = if cfg.timeout > 0 {
        tokio::time::timeout(Duration::from_secs(cfg.timeout), connect)
            .await
            .map_err(|_| {
                Error::upstream(format!(
                    "dial timeout after {}s connecting to {}",
                    cfg.timeout, addr
                ))
            })?
    } else {
        connect.await
    };

    stream.map_err(|e| Error::upstream(format!("TCP connection to {} failed: {}", addr, e)))
}

async fn resolve_addr(authority: &str, cfg: &DomainConfig, default_port: u16) -> Result<SocketAddr> {
    if !cfg.ip.is_empty() {
        return cfg.ip.parse().map_err(|e| {
            Error::config(format!("invalid upstream address '{}': {}", cfg.ip, e))
        });
    }

    // Unconfigured host: forward best-effort to the authority itself.
    let target = if host_without_port(authority) == authority {
        format!("{}:{}", authority, default_port)
    } else {
        authority.to_string()
    };

    let resolved = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| Error::upstream(format!("cannot resolve {}: {}", target, e)))?
        .next()
        .ok_or_else(|| Error::upstream(format!("no address for {}", target)));
    resolved
}

/// Client TLS config that accepts any upstream certificate.
fn insecure_client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureUpstreamVerifier))
                .with_no_client_auth();
            config.alpn_protocols = vec![b"http/1.1".to_vec()];
            Arc::new(config)
        })
        .clone()
}

/// Accepts every upstream certificate without verification.
#[derive(Debug)]
struct InsecureUpstreamVerifier;

impl ServerCertVerifier for InsecureUpstreamVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_report;

    fn domain(ip: &str, timeout: u64) -> DomainConfig {
        DomainConfig {
            ip: ip.to_string(),
            timeout,
            ..DomainConfig::default()
        }
    }

    #[tokio::test]
    async fn test_dial_configured_upstream() {
        let t = test_report!("Dialing uses the configured upstream address");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Keep accepted sockets alive so the handshake stays open.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let cfg = domain(&addr.to_string(), 5);
        let conn = connect("example.com", &cfg, false).await.unwrap();
        t.assert_true("connection open", !conn.is_closed());
    }

    #[tokio::test]
    async fn test_dial_error_surfaces() {
        let t = test_report!("A dead upstream is an upstream error");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cfg = domain(&addr.to_string(), 1);
        let result = connect("example.com", &cfg, false).await;
        t.assert_true("dial failed", result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_configured_address_is_config_error() {
        let t = test_report!("A malformed upstream address is a config error");
        let cfg = domain("not-an-address", 1);
        let result = connect("example.com", &cfg, false).await;
        match result {
            Err(Error::Config(_)) => t.assert_true("config error", true),
            other => t.assert_true(&format!("unexpected: {:?}", other.is_ok()), false),
        }
    }
}
