//! DNS Record Server
//!
//! Minimal authoritative/forwarding DNS server with a live-editable record
//! store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DNS RECORD SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DNS Server (UDP 53)   ←── A queries, one task per datagram │
//! │  Record Store (JSON)   ←── name → IPv4, rewritten on change │
//! │  Upstream Resolver     ←── names under the forward suffix   │
//! │  HTTP API (3000)       ←── /records administration, metrics │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod api;
mod config;
mod dns;
mod records;
mod types;

use api::Metrics;
use config::ServerConfig;
use records::RecordStore;

/// DNS Record Server - A records from a local store, with suffix forwarding
#[derive(Parser, Debug)]
#[command(name = "dns-record-server")]
#[command(version)]
#[command(about = "Authoritative/forwarding DNS server with an HTTP-managed record store", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "dns-server.toml")]
    config: PathBuf,

    /// JSON file holding the DNS records
    #[arg(short, long, env = "DNS_RECORDS_FILE")]
    records_file: Option<PathBuf>,

    /// HTML page served at the API root
    #[arg(long, env = "INDEX_FILE")]
    index_file: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "PORT")]
    api_port: Option<u16>,

    /// DNS server port (requires root or CAP_NET_BIND_SERVICE for port 53)
    #[arg(long, env = "DNS_PORT")]
    dns_port: Option<u16>,

    /// Names ending in this suffix are resolved upstream with the suffix removed
    #[arg(long, env = "FORWARD_SUFFIX")]
    forward_suffix: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into())
        )
        .init();

    info!("🌐 DNS Record Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        ServerConfig::load(&args.config)?
    } else {
        warn!("Config file {:?} not found, using defaults", args.config);
        ServerConfig::default()
    };

    // Override config with CLI args
    let config = config
        .with_records_file(args.records_file)
        .with_index_file(args.index_file)
        .with_api_port(args.api_port)
        .with_dns_port(args.dns_port)
        .with_forward_suffix(args.forward_suffix)
        .validate()?;

    if args.write_config {
        config.save(&args.config)?;
        info!("📝 Configuration written to {:?}", args.config);
        return Ok(());
    }

    info!("⚙️  Configuration:");
    info!("   Records file: {:?}", config.records_file);
    info!("   Index page: {:?}", config.index_file);
    info!("   DNS port: {}", config.dns_port);
    info!("   API port: {}", config.api_port);
    info!("   Forward suffix: {}", config.forward_suffix.as_deref().unwrap_or("(disabled)"));
    info!("   Upstream timeout: {}s", config.upstream_timeout_secs);

    let shared_config = Arc::new(config);

    // Best-effort load; never fails startup
    let store = Arc::new(RecordStore::open(&shared_config.records_file));
    if store.is_empty().await {
        warn!("Record store is empty, only forwarded names will resolve");
    }

    let metrics = Arc::new(Metrics::new());
    metrics.set_records(store.len().await as u64);

    // Start all services concurrently
    let dns_handle = tokio::spawn(dns::run_dns_server(
        shared_config.clone(),
        store.clone(),
        metrics.clone(),
    ));

    let api_handle = tokio::spawn(api::run_api_server(
        shared_config.clone(),
        store.clone(),
        metrics.clone(),
    ));

    info!("✅ All services started");
    info!("   Press Ctrl+C to shutdown gracefully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = dns_handle => {
            error!("DNS server exited: {:?}", result);
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    info!("👋 DNS Record Server shutting down with {} records", store.len().await);
    Ok(())
}
