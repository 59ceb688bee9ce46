//! Standalone resize worker. Same configuration as the API; serves no HTTP.

use anyhow::Context;
use pawprint_api::setup::{initialize_state, shutdown_signal, start_worker};
use pawprint_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    config
        .validate()
        .context("Configuration validation failed")?;
    pawprint_api::telemetry::init_telemetry().context("Failed to initialize telemetry")?;

    let state = initialize_state(config).await?;
    let worker = start_worker(&state);

    shutdown_signal().await;
    worker.shutdown().await;

    tracing::info!("Worker stopped");
    Ok(())
}
