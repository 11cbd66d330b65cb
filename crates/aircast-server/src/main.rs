//! # aircast
//!
//! Signaling and relay server for one-to-many live broadcast sessions.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! aircast
//!
//! # Run with environment variables
//! AIRCAST_PORT=8080 AIRCAST_HOST=0.0.0.0 aircast
//! ```
//!
//! Configuration is also read from `aircast.toml` when present (see
//! `config.rs` for the search path).

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aircast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting aircast on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
