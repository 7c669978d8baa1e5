//! # Rendezvous
//!
//! WebRTC signaling relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! rendezvous
//!
//! # Run with a config file in the working directory
//! cp rendezvous.toml.example rendezvous.toml && rendezvous
//!
//! # Run with environment variables
//! RENDEZVOUS_PORT=8443 RENDEZVOUS_HOST=0.0.0.0 rendezvous
//! ```
//!
//! TLS is expected to be terminated in front of the relay.

use anyhow::Result;
use rendezvous_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous_server=debug,rendezvous_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!("Starting Rendezvous relay on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
