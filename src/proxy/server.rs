//! Listener setup and connection serving.
//!
//! One plaintext HTTP listener and one TLS interception listener share
//! the same pipeline logic; the interception listener terminates TLS
//! with certificates resolved per SNI from the certificate store.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use super::pipeline::Pipeline;
use super::response::internal_error_response;
use crate::activity::ActivityHandle;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::tls::CertStore;

/// The main proxy server: one HTTP listener, one HTTPS interception
/// listener.
pub struct ProxyServer {
    config: Arc<Config>,
    cache: Arc<dyn ResponseCache>,
    cert_store: Arc<CertStore>,
    activity: Option<ActivityHandle>,
    http_addr: String,
    https_addr: String,
    http_listener: Option<TcpListener>,
    https_listener: Option<TcpListener>,
}

impl ProxyServer {
    pub fn new(
        config: Config,
        cache: Arc<dyn ResponseCache>,
        cert_store: Arc<CertStore>,
        http_addr: impl Into<String>,
        https_addr: impl Into<String>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            cert_store,
            activity: None,
            http_addr: http_addr.into(),
            https_addr: https_addr.into(),
            http_listener: None,
            https_listener: None,
        }
    }

    /// Enable request-lifecycle tracking against the activity service.
    pub fn with_activity(mut self, activity: Option<ActivityHandle>) -> Self {
        self.activity = activity;
        self
    }

    /// Bind both listeners and return their local addresses. Binding to
    /// port 0 discovers the assigned ports, which the tests rely on.
    pub async fn bind(&mut self) -> Result<(SocketAddr, SocketAddr)> {
        let http_listener = bind_tcp(&self.http_addr).await?;
        let https_listener = bind_tcp(&self.https_addr).await?;

        let http_addr = local_addr(&http_listener)?;
        let https_addr = local_addr(&https_listener)?;

        self.http_listener = Some(http_listener);
        self.https_listener = Some(https_listener);

        Ok((http_addr, https_addr))
    }

    /// Accept connections until the shutdown signal fires.
    ///
    /// Must call `bind()` first. Panics if no listener is stored.
    pub async fn serve(mut self, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<()> {
        let http_listener = self
            .http_listener
            .take()
            .expect("must call bind() before serve()");
        let https_listener = self
            .https_listener
            .take()
            .expect("must call bind() before serve()");

        let acceptor = TlsAcceptor::from(Arc::new(self.cert_store.clone().server_config()));

        let http_pipeline = Arc::new(
            Pipeline::new(self.config.clone(), self.cache.clone(), false)
                .with_activity(self.activity.clone()),
        );
        let https_pipeline = Arc::new(
            Pipeline::new(self.config.clone(), self.cache.clone(), true)
                .with_activity(self.activity.clone()),
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    return Ok(());
                }
                result = http_listener.accept() => {
                    let (stream, client_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    tracing::debug!(client = %client_addr, "New connection");
                    let pipeline = http_pipeline.clone();
                    tokio::spawn(async move {
                        drive_connection(stream, pipeline, client_addr.to_string()).await;
                    });
                }
                result = https_listener.accept() => {
                    let (stream, client_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    tracing::debug!(client = %client_addr, "New TLS connection");
                    let pipeline = https_pipeline.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        let tls_stream = match acceptor.accept(stream).await {
                            Ok(stream) => stream,
                            Err(e) => {
                                // Issuance or handshake failures abort
                                // only this connection.
                                tracing::debug!(client = %client_addr, error = %e, "TLS handshake failed");
                                return;
                            }
                        };
                        drive_connection(tls_stream, pipeline, client_addr.to_string()).await;
                    });
                }
            }
        }
    }

    /// Bind and serve until shutdown.
    pub async fn run_until_shutdown(
        mut self,
        shutdown: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        let (http_addr, https_addr) = self.bind().await?;
        tracing::info!(http = %http_addr, https = %https_addr, "Proxy listening");
        self.serve(shutdown).await
    }
}

async fn bind_tcp(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::config(format!("Invalid listen address '{}': {}", addr, e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::proxy(format!("Failed to bind to {}: {}", addr, e)))
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr> {
    listener
        .local_addr()
        .map_err(|e| Error::proxy(format!("Failed to get local address: {}", e)))
}

/// Serve one client connection with HTTP/1.1. Each request handler runs
/// in its own task so a panic becomes a 500 instead of killing the
/// connection loop.
async fn drive_connection<S>(stream: S, pipeline: Arc<Pipeline>, client_addr: String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);

    let service = service_fn(move |req| {
        let pipeline = pipeline.clone();
        async move {
            match tokio::spawn(pipeline.handle(req)).await {
                Ok(response) => Ok::<_, Infallible>(response),
                Err(e) => {
                    if e.is_panic() {
                        tracing::error!(error = %e, "Request handler panicked");
                    }
                    Ok(internal_error_response())
                }
            }
        }
    });

    if let Err(e) = http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(io, service)
        .await
    {
        let err_str = e.to_string();
        if !err_str.contains("connection closed") && !err_str.contains("early eof") {
            tracing::debug!(client = %client_addr, error = %e, "Connection error");
        }
    }
}
