//! Shape sampler (v1)
//!
//! A transparent proxy that learns the response shapes of an HTTP JSON API.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ proxy handler ──▶ upstream API
//!                   │    ▲
//!                   │    └── response returned unchanged
//!                   ▼
//!              interceptor (JSON filter, fingerprint, redact, normalize)
//!                   │ try_send
//!                   ▼
//!              observation queue ──▶ worker ──▶ RetentionCoordinator ──▶ Repository
//!                                                                    (memory | sqlite)
//!
//!     Admin client ──▶ admin API (bearer auth) ──▶ Repository (read only)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use shape_sampler::config::{load_config, SamplerConfig};
use shape_sampler::lifecycle::{signals, Sampler, Shutdown};
use shape_sampler::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "shape-sampler")]
#[command(about = "Transparent proxy that samples API response shapes", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => SamplerConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("shape-sampler v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        storage = ?config.storage.backend,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::wait_for_signal(shutdown.clone()));

    Sampler::from_config(config)?.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
