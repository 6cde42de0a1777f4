//! decoynet - a multi-protocol deception honeypot
//!
//! Binds a configurable set of TCP ports, classifies each to a protocol
//! (FTP, HTTP, or generic), and records every attacker interaction as a
//! line-oriented event stream on stdout:
//! - FTP sessions behind an upstream PROXY-protocol stream proxy
//! - HTTP bait endpoints behind a TLS-terminating reverse proxy
//! - one-shot line capture on everything else

mod config;
mod events;
mod handlers;
mod proxy;
mod web;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = config::Config::load()?;

    // Diagnostics go to stderr; stdout belongs to the event records
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting decoynet...");

    let sink = events::EventSink::stdout();
    handlers::start_all(&config, sink).await?;

    // Run until interrupted; sessions are not drained on exit
    tokio::signal::ctrl_c().await?;
    info!("Shutting down honeypot...");

    Ok(())
}
