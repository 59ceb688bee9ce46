//! Application setup and initialization
//!
//! Wiring shared by the API binary and the standalone worker: database, storage,
//! queue, record stores and the HTTP router.

pub mod database;
pub mod routes;
pub mod server;
pub mod storage;
pub mod worker;

pub use routes::setup_routes;
pub use server::{shutdown_signal, start_server};
pub use worker::start_worker;

use crate::state::AppState;
use anyhow::{Context, Result};
use pawprint_core::Config;
use pawprint_db::{OwnerRegistry, PgJobQueue};
use std::sync::Arc;

/// Build the shared state from configuration: connect, migrate, open storage.
pub async fn initialize_state(config: Config) -> Result<Arc<AppState>> {
    let pool = database::setup_database(&config).await?;
    let storage = storage::setup_storage(&config).await?;

    let queue = Arc::new(PgJobQueue::new(
        pool.clone(),
        config.queue_name(),
        config.job_max_attempts(),
    ));
    let owners = OwnerRegistry::postgres(pool.clone());

    Ok(Arc::new(AppState::new(
        config,
        storage,
        queue,
        owners,
        Some(pool),
    )))
}

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    crate::telemetry::init_telemetry().context("Failed to initialize telemetry")?;
    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let state = initialize_state(config.clone()).await?;
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
