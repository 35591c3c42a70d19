//! Skinfolio daemon entry point
//!
//! Loads configuration, opens the store, and runs the capture scheduler
//! until interrupted.

use anyhow::Context;
use skinfolio::config::AppConfig;
use skinfolio::scheduler::{CaptureScheduler, SystemClock};
use skinfolio::state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skinfolio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Skinfolio...");

    let data_dir = std::env::var_os("SKINFOLIO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = AppConfig::load(&data_dir).context("Failed to load configuration")?;
    let state = Arc::new(AppState::new(config).context("Failed to initialize application state")?);

    let scheduler = CaptureScheduler::new(state, Arc::new(SystemClock));
    scheduler.start();

    let status = scheduler.status();
    tracing::info!(
        "Scheduler running={}, next capture at {}",
        status.running,
        status.next_fire_time
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down...");
    scheduler.stop();

    Ok(())
}
