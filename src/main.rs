//! Webhook edge proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────────┐
//!                     │                    EDGE PROXY                     │
//!   Browser           │                                                   │
//!   ──────────────────┼─▶ http::server ─▶ http::pipeline                  │
//!                     │                    │ origin guard  (security)     │
//!                     │                    │ challenge     (security) ────┼──▶ attestation
//!                     │                    │ rate limit    (security) ─┐  │
//!                     │                    │ payload                   │  │
//!                     │                    │ webhook call  (upstream) ─┼──┼──▶ automation
//!   ◀─────────────────┼── response + CORS ◀┘                           │  │    webhook
//!                     │                                                ▼  │
//!   edge-cli ─────────┼─▶ admin API ─────────────────────────────▶ store  │
//!                     │                                   (memory/redis)  │
//!                     │  config + watcher │ observability │ lifecycle      │
//!                     └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_proxy::admin::run_admin;
use edge_proxy::config::validation::validate_config;
use edge_proxy::config::watcher::ConfigWatcher;
use edge_proxy::config::{load_config, ConfigError, EdgeConfig};
use edge_proxy::http::HttpServer;
use edge_proxy::lifecycle::{spawn_signal_handler, Shutdown};
use edge_proxy::observability::{logging, metrics};
use edge_proxy::store::open_store;

#[derive(Parser)]
#[command(name = "edge-proxy", version, about = "Rate-limited edge proxy for automation webhooks")]
struct Args {
    /// TOML config file; watched for changes
    #[arg(short, long, env = "EDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = EdgeConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-proxy starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let store = open_store(&config.store, shutdown.subscribe()).await?;

    // The watcher must stay alive for the life of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        response_mode = ?config.upstream.response_mode,
        "Configuration loaded"
    );

    let admin = config.admin.clone();
    let server = HttpServer::new(config, store)?;

    if admin.enabled {
        let admin_listener = TcpListener::bind(&admin.bind_address).await?;
        let state = server.state();
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = run_admin(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
