//! DON request gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     User (HTTP POST)                                      DON nodes (websocket)
//!     ────────────────┐                                    ┌────────────────────
//!                     ▼                                    ▲
//!              ┌─────────────┐   ┌────────────┐    ┌───────┴──────────┐
//!              │ user server │──▶│ dispatcher │──▶ │   MultiHandler   │
//!              └─────────────┘   └─────┬──────┘    │ (per routing key)│
//!                     ▲                │ Callback  └───────┬──────────┘
//!                     │                ▼                   │ node responses
//!              (body, status) ◀── ResponseWaiter ◀─────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use don_gateway::config::{load_config, GatewayConfig};
use don_gateway::handlers::DefaultHandlerFactory;
use don_gateway::lifecycle::signals::wait_for_termination;
use don_gateway::observability::logging::init_logging;
use don_gateway::observability::metrics::init_metrics;
use don_gateway::observability::PrometheusMetrics;
use don_gateway::Gateway;

#[derive(Parser)]
#[command(name = "don-gateway")]
#[command(about = "Request gateway in front of DON nodes", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "don-gateway starting");
    tracing::info!(
        gateway_id = %config.gateway_id,
        user_bind = %config.user_server.bind_address,
        node_bind = %config.node_server.bind_address,
        dons = config.dons.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Gateway::from_config(&config, &DefaultHandlerFactory, Arc::new(PrometheusMetrics))?;
    gateway.start().await?;

    wait_for_termination().await;

    gateway.close().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
