//! Configuration parsing and management
//!
//! The config file is a JSON document mapping hostnames to per-domain
//! policy bundles. It is loaded once at startup and immutable for the
//! process lifetime. Derived numeric fields (TTL in seconds, sizes in
//! bytes) are computed here so the request path never re-parses units.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

const SIZE_VALUE: u64 = 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Per-domain settings, keyed by the `Host` header value (without port)
    #[serde(default)]
    pub domains: HashMap<String, DomainConfig>,
}

/// Settings for a single upstream domain
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DomainConfig {
    /// Upstream address as `ip:port`
    #[serde(default)]
    pub ip: String,

    /// Dial timeout in seconds; 0 means no timeout
    #[serde(default)]
    pub timeout: u64,

    /// TCP keep-alive in seconds; 0 disables keep-alive
    #[serde(default)]
    pub keep_alive: u64,

    /// Upper bound of pooled upstream connections; 0 disables pooling
    #[serde(default)]
    pub max_connections: usize,

    /// What the client's own browser is told to do
    #[serde(default)]
    pub browser_cache: BrowserCachePolicy,

    /// The proxy's server-side response cache policy
    #[serde(default)]
    pub cache: CachePolicy,
}

/// Browser-facing `Cache-Control` policy
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BrowserCachePolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub ttl: u64,

    /// One of `h`, `m`, `s`
    #[serde(default)]
    pub ttl_units: String,

    /// Derived at load time
    #[serde(skip)]
    pub ttl_secs: u64,
}

/// Server-side response cache policy
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CachePolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub ttl: u64,

    /// One of `h`, `m`, `s`
    #[serde(default)]
    pub ttl_units: String,

    /// Maximum total cache size for the host partition
    #[serde(default)]
    pub max_size: u64,

    /// One of `kb`, `mb`, `gb` (case-insensitive)
    #[serde(default)]
    pub size_units: String,

    /// Path allow-list: only paths ending with one of these suffixes are cached
    #[serde(default)]
    pub cached: Vec<String>,

    /// Path deny-list: paths containing any of these substrings are not cached
    #[serde(default)]
    pub no_cached: Vec<String>,

    /// Per-object size limit
    #[serde(default)]
    pub cache_object: ObjectPolicy,

    /// Derived at load time
    #[serde(skip)]
    pub ttl_secs: u64,

    /// Derived at load time
    #[serde(skip)]
    pub max_size_bytes: u64,
}

/// Size limit for a single cached object
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectPolicy {
    #[serde(default)]
    pub max_size: u64,

    #[serde(default)]
    pub size_units: String,

    /// Derived at load time
    #[serde(skip)]
    pub max_size_bytes: u64,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a JSON string
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(content)
            .map_err(|e| Error::config(format!("Invalid JSON: {}", e)))?;

        for (host, domain) in config.domains.iter_mut() {
            domain.finalize().map_err(|e| match e {
                Error::Config(msg) => Error::config(format!("domain '{}': {}", host, msg)),
                other => other,
            })?;
        }

        Ok(config)
    }

    /// Look up the domain configuration for a `Host` header value.
    /// Any `:port` suffix is ignored.
    pub fn domain(&self, host: &str) -> Option<&DomainConfig> {
        self.domains.get(host_without_port(host))
    }
}

impl DomainConfig {
    /// Compute the derived numeric fields from the raw unit-tagged ones.
    fn finalize(&mut self) -> Result<()> {
        if self.cache.enabled {
            self.cache.ttl_secs = ttl_to_secs(self.cache.ttl, &self.cache.ttl_units)?;
            self.cache.max_size_bytes = size_to_bytes(self.cache.max_size, &self.cache.size_units)?;
            self.cache.cache_object.max_size_bytes = size_to_bytes(
                self.cache.cache_object.max_size,
                &self.cache.cache_object.size_units,
            )?;
        }

        if self.browser_cache.enabled {
            self.browser_cache.ttl_secs =
                ttl_to_secs(self.browser_cache.ttl, &self.browser_cache.ttl_units)?;
        }

        Ok(())
    }
}

/// Strip a trailing `:port` from a `Host` header value, handling
/// bracketed IPv6 literals.
pub fn host_without_port(host: &str) -> &str {
    if let Some(stripped) = host.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => &stripped[..end],
            None => host,
        }
    } else {
        match host.rfind(':') {
            Some(idx) => &host[..idx],
            None => host,
        }
    }
}

fn ttl_to_secs(ttl: u64, units: &str) -> Result<u64> {
    match units {
        "h" => Ok(ttl * 3600),
        "m" => Ok(ttl * 60),
        "s" => Ok(ttl),
        other => Err(Error::config(format!(
            "unknown ttl_units '{}' (expected h, m or s)",
            other
        ))),
    }
}

fn size_to_bytes(size: u64, units: &str) -> Result<u64> {
    match units.to_ascii_lowercase().as_str() {
        "kb" => Ok(size * SIZE_VALUE),
        "mb" => Ok(size * SIZE_VALUE * SIZE_VALUE),
        "gb" => Ok(size * SIZE_VALUE * SIZE_VALUE * SIZE_VALUE),
        other => Err(Error::config(format!(
            "unknown size_units '{}' (expected kb, mb or gb)",
            other
        ))),
    }
}
