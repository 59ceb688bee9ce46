//! Storage setup and initialization

use anyhow::{Context, Result};
use pawprint_core::Config;
use pawprint_storage::{create_storage, Storage};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing object storage...");
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(backend = %storage.backend_type(), "Object storage initialized");
    Ok(storage)
}
