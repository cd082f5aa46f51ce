//! Breaker Gateway
//!
//! A request-routing gateway built with Tokio and Axum whose routes can be
//! guarded by circuit breakers.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                        GATEWAY                           │
//!                    │                                                          │
//!  Client Request    │  ┌─────────┐    ┌──────────┐    ┌────────────────────┐   │
//!  ──────────────────┼─▶│  http   │───▶│ routing  │───▶│ resilience::filter │   │
//!                    │  │ server  │    │  router  │    │  (breaker guard)   │   │
//!                    │  └─────────┘    └──────────┘    └─────────┬──────────┘   │
//!                    │                      ▲       permitted    │   rejected / │
//!                    │                      │                    ▼   failed     │
//!                    │                      │           ┌──────────────────┐    │
//!  Client Response   │                      └─forward:──│     dispatch     │────┼──▶ Downstream
//!  ◀─────────────────┼───────────────────────────────────│  gateway / http  │    │
//!                    │                                   └──────────────────┘    │
//!                    │  ┌────────────────────────────────────────────────────┐  │
//!                    │  │              Cross-Cutting Concerns                │  │
//!                    │  │  config + hot reload · observability · admin API   │  │
//!                    │  │  lifecycle (signals, graceful shutdown)            │  │
//!                    │  └────────────────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use breaker_gateway::admin::setup_admin_router;
use breaker_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use breaker_gateway::lifecycle::{signals::spawn_signal_listener, Shutdown};
use breaker_gateway::observability::{logging::init_logging, metrics::init_metrics};
use breaker_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "breaker-gateway", version, about = "Circuit-breaking request gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Watch the configuration file and reload routes on change.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "breaker-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_listener(&shutdown);

    // Hot reload. The watcher handle must outlive the server.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), Some(updates))
        }
        _ => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config.clone()).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    })?;

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin = setup_admin_router(server.state().clone());
        let mut admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
