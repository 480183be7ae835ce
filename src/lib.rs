//! Propylon - a caching TLS-interception proxy
//!
//! This crate provides a per-domain caching proxy that terminates TLS
//! for configured origin domains with on-the-fly issued certificates.
//!
//! # Features
//!
//! - **TLS interception**: per-hostname leaf certificates signed by a
//!   provisioned root CA, persisted across restarts
//! - **Response caching**: per-host partitions with TTL expiry and
//!   capacity-based admission control
//! - **Per-domain policy**: upstream address, dial timeout, keep-alive,
//!   connection pooling, cache and browser-cache rules
//! - **Pluggable cache backends**: in-process store or the remote
//!   activity service over gRPC
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use propylon::{CertStore, Config, InMemoryCache, ProxyServer, RootAuthority};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("configs/config.json")?;
//!     let authority = RootAuthority::from_files("certs/ca.pem", "certs/ca.key")?;
//!     let store = Arc::new(CertStore::new(authority, "certs"));
//!     let cache = Arc::new(InMemoryCache::new());
//!
//!     let server = ProxyServer::new(config, cache, store, "0.0.0.0:80", "0.0.0.0:443");
//!     let (_tx, rx) = tokio::sync::oneshot::channel();
//!     server.run_until_shutdown(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod cache;
pub mod config;
pub mod error;
pub mod proxy;
pub mod retry;
pub mod tls;
pub mod upstream;

#[cfg(test)]
pub mod test_support;

pub use activity::ActivityHandle;
pub use cache::{ActivityCache, InMemoryCache, ResponseCache};
pub use config::{Config, DomainConfig};
pub use error::{Error, Result};
pub use proxy::{Pipeline, ProxyServer};
pub use retry::Retrier;
pub use tls::{CertStore, GeneratedAuthority, RootAuthority};
