//! Propylon CLI - a caching TLS-interception proxy

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use propylon::cache::{ActivityCache, InMemoryCache, ResponseCache};
use propylon::{ActivityHandle, CertStore, Config, GeneratedAuthority, ProxyServer, Retrier, RootAuthority};

#[derive(Parser)]
#[command(name = "propylon")]
#[command(about = "A caching TLS-interception proxy with per-domain cache policies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy servers
    Run {
        /// Path to the JSON domain configuration file
        #[arg(short, long, default_value = "configs/config.json")]
        config: PathBuf,

        /// Listen address for the plaintext HTTP proxy
        #[arg(long, default_value = "0.0.0.0:80")]
        http_addr: String,

        /// Listen address for the HTTPS interception proxy
        #[arg(long, default_value = "0.0.0.0:443")]
        https_addr: String,

        /// Path to the root CA certificate
        #[arg(long, default_value = "certs/ca.pem")]
        ca_cert: PathBuf,

        /// Path to the root CA private key
        #[arg(long, default_value = "certs/ca.key")]
        ca_key: PathBuf,

        /// Directory for generated per-host certificates
        #[arg(long, default_value = "certs")]
        certs_dir: PathBuf,

        /// Address of the activity service; enables the remote cache
        /// backend and request-lifecycle tracking
        #[arg(long)]
        activity: Option<String>,

        /// Log level (error, warn, info, debug, trace)
        #[arg(short, long, default_value = "info")]
        log_level: String,
    },

    /// Generate a new root CA certificate
    GenerateCa {
        /// Output directory for ca.pem and ca.key
        #[arg(short, long, default_value = "certs")]
        out: PathBuf,

        /// Certificate filename
        #[arg(long, default_value = "ca.pem")]
        cert_name: String,

        /// Key filename
        #[arg(long, default_value = "ca.key")]
        key_name: String,
    },

    /// Validate a configuration file
    ValidateConfig {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            http_addr,
            https_addr,
            ca_cert,
            ca_key,
            certs_dir,
            activity,
            log_level,
        } => {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();

            tracing::info!(path = %config.display(), "Loading configuration");
            let cfg = Config::from_file(&config)?;
            tracing::info!(domains = cfg.domains.len(), "Configuration loaded");

            let authority = RootAuthority::from_files(&ca_cert, &ca_key)?;
            let cert_store = Arc::new(CertStore::new(authority, certs_dir));

            let activity_handle = match activity {
                Some(ref addr) => {
                    tracing::info!(address = %addr, "Connecting to activity service");
                    Some(ActivityHandle::connect(addr).await?)
                }
                None => None,
            };

            let cache: Arc<dyn ResponseCache> = match &activity_handle {
                Some(handle) => Arc::new(ActivityCache::new(handle.clone())),
                None => Arc::new(InMemoryCache::new()),
            };

            let server = ProxyServer::new(cfg.clone(), cache.clone(), cert_store, http_addr, https_addr)
                .with_activity(activity_handle.clone());

            // Replay anything that started but never completed before we
            // begin accepting traffic.
            if let Some(handle) = activity_handle {
                let retrier = Retrier::new(Arc::new(cfg), cache, handle);
                tokio::spawn(async move {
                    retrier.process_pending().await;
                });
            }

            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                tracing::info!("Shutting down...");
                let _ = shutdown_tx.send(());
            });

            server.run_until_shutdown(shutdown_rx).await?;
        }

        Commands::GenerateCa {
            out,
            cert_name,
            key_name,
        } => {
            std::fs::create_dir_all(&out)?;

            let cert_path = out.join(&cert_name);
            let key_path = out.join(&key_name);

            println!("Generating root CA certificate...");

            let ca = GeneratedAuthority::generate()?;
            ca.save(&cert_path, &key_path)?;

            println!("Root CA generated successfully!");
            println!();
            println!("  Certificate: {}", cert_path.display());
            println!("  Private key: {}", key_path.display());
            println!();
            println!("To run the proxy:");
            println!(
                "  propylon run --ca-cert {} --ca-key {}",
                cert_path.display(),
                key_path.display()
            );
            println!();
            println!("Clients must trust this certificate for interception to work.");
            println!("IMPORTANT: Keep the private key secure!");
        }

        Commands::ValidateConfig { config } => {
            println!("Validating configuration: {}", config.display());

            let cfg = Config::from_file(&config)?;

            println!("Configuration is valid!");
            println!();
            println!("  Domains: {}", cfg.domains.len());

            let mut hosts: Vec<_> = cfg.domains.iter().collect();
            hosts.sort_by_key(|(host, _)| host.as_str());

            for (host, domain) in hosts {
                println!();
                println!("  {}", host);
                println!("    upstream: {}", domain.ip);
                println!(
                    "    timeout: {}s, keep-alive: {}s, max connections: {}",
                    domain.timeout, domain.keep_alive, domain.max_connections
                );
                if domain.cache.enabled {
                    println!(
                        "    cache: ttl {}s, max {} bytes, object max {} bytes",
                        domain.cache.ttl_secs,
                        domain.cache.max_size_bytes,
                        domain.cache.cache_object.max_size_bytes
                    );
                    if !domain.cache.cached.is_empty() {
                        println!("    cached suffixes: {:?}", domain.cache.cached);
                    }
                    if !domain.cache.no_cached.is_empty() {
                        println!("    excluded paths: {:?}", domain.cache.no_cached);
                    }
                } else {
                    println!("    cache: disabled");
                }
                if domain.browser_cache.enabled {
                    println!("    browser cache: max-age={}", domain.browser_cache.ttl_secs);
                } else {
                    println!("    browser cache: disabled");
                }
            }
        }
    }

    Ok(())
}
