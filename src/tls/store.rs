//! On-disk certificate store with on-the-fly issuance.
//!
//! Issued leaves persist across restarts as PEM pairs named by hostname
//! under a fixed directory. A process-wide mutex with a double-checked
//! existence test keeps concurrent first-use issuance for the same
//! hostname down to exactly one generation. Loaded certified keys are
//! held in a small LRU so the disk is not re-read per handshake.

use lru::LruCache;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::ca::RootAuthority;
use crate::error::{Error, Result};

const LOADED_CACHE_CAPACITY: usize = 1000;

/// Certificate store keyed by hostname.
pub struct CertStore {
    authority: RootAuthority,
    dir: PathBuf,
    /// Serializes certificate generation across all hostnames.
    issue_lock: Mutex<()>,
    /// In-memory layer over the on-disk pairs.
    loaded: Mutex<LruCache<String, Arc<CertifiedKey>>>,
    issued: AtomicUsize,
}

impl std::fmt::Debug for CertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertStore")
            .field("dir", &self.dir)
            .field("issued", &self.issued.load(Ordering::Relaxed))
            .finish()
    }
}

impl CertStore {
    /// Create a store backed by `dir`, signing new leaves with `authority`.
    pub fn new(authority: RootAuthority, dir: impl Into<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(LOADED_CACHE_CAPACITY).unwrap();
        Self {
            authority,
            dir: dir.into(),
            issue_lock: Mutex::new(()),
            loaded: Mutex::new(LruCache::new(capacity)),
            issued: AtomicUsize::new(0),
        }
    }

    /// Number of certificates generated by this process. Reused on-disk
    /// pairs do not count.
    pub fn issued_count(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    fn paths(&self, hostname: &str) -> (PathBuf, PathBuf) {
        let cert = self.dir.join(format!("{}.pem", hostname));
        let key = self.dir.join(format!("{}.key", hostname));
        (cert, key)
    }

    /// Return a TLS-usable certified key for the hostname, generating
    /// and persisting a leaf if none exists yet.
    pub fn certified_key_for(&self, hostname: &str) -> Result<Arc<CertifiedKey>> {
        if let Some(key) = self.loaded.lock().unwrap().get(hostname) {
            return Ok(key.clone());
        }

        let (cert_path, key_path) = self.paths(hostname);

        if !cert_path.exists() {
            let _guard = self.issue_lock.lock().unwrap();

            // Another task may have generated it while we waited.
            if !cert_path.exists() {
                tracing::info!(hostname = %hostname, "Issuing certificate");
                self.generate_and_persist(hostname, &cert_path, &key_path)?;
                self.issued.fetch_add(1, Ordering::Relaxed);
            }
        }

        let certified = Arc::new(self.load_certified(&cert_path, &key_path)?);
        self.loaded
            .lock()
            .unwrap()
            .put(hostname.to_string(), certified.clone());

        Ok(certified)
    }

    fn generate_and_persist(&self, hostname: &str, cert_path: &Path, key_path: &Path) -> Result<()> {
        let issued = self.authority.issue_for_host(hostname)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::certificate(format!(
                "Failed to create certs directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        std::fs::write(cert_path, &issued.cert_pem).map_err(|e| {
            Error::certificate(format!(
                "Failed to write '{}': {}",
                cert_path.display(),
                e
            ))
        })?;

        std::fs::write(key_path, &issued.key_pem).map_err(|e| {
            Error::certificate(format!("Failed to write '{}': {}", key_path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(key_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(key_path, perms)?;
        }

        Ok(())
    }

    fn load_certified(&self, cert_path: &Path, key_path: &Path) -> Result<CertifiedKey> {
        let cert_pem = std::fs::read(cert_path).map_err(|e| {
            Error::certificate(format!("Failed to read '{}': {}", cert_path.display(), e))
        })?;
        let key_pem = std::fs::read(key_path).map_err(|e| {
            Error::certificate(format!("Failed to read '{}': {}", key_path.display(), e))
        })?;

        let mut chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::certificate(format!("Invalid certificate PEM: {}", e)))?;

        if chain.is_empty() {
            return Err(Error::certificate(format!(
                "No certificate found in '{}'",
                cert_path.display()
            )));
        }

        // Present [leaf, CA] so clients can verify the chain.
        chain.push(self.authority.cert_der().clone());

        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| Error::certificate(format!("Invalid key PEM: {}", e)))?
            .ok_or_else(|| {
                Error::certificate(format!("No private key found in '{}'", key_path.display()))
            })?;

        let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key)
            .map_err(|e| Error::tls(format!("Unusable private key: {}", e)))?;

        Ok(CertifiedKey::new(chain, signing_key))
    }

    /// Build the rustls server configuration for the interception
    /// listener. Certificates resolve per-connection from SNI.
    pub fn server_config(self: Arc<Self>) -> ServerConfig {
        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(self);

        // HTTP/1.1 only; the proxy does not speak h2.
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        config
    }
}

impl ResolvesServerCert for CertStore {
    fn resolve(&self, client_hello: ClientHello) -> Option<Arc<CertifiedKey>> {
        let hostname = client_hello.server_name()?;

        match self.certified_key_for(hostname) {
            Ok(key) => Some(key),
            Err(e) => {
                // Fails only this handshake; the listener stays up.
                tracing::error!(hostname = %hostname, error = %e, "Certificate resolution failed");
                None
            }
        }
    }
}
