//! Resize worker startup, shared by the API (embedded) and the standalone binary.

use pawprint_worker::{ResizeWorker, WorkerPool, WorkerPoolConfig};
use std::sync::Arc;

use crate::state::AppState;

pub fn start_worker(state: &AppState) -> WorkerPool {
    let pool_config = WorkerPoolConfig::from_config(&state.config);
    let handler = Arc::new(ResizeWorker::from_config(
        &state.config,
        state.storage.clone(),
        state.owners.clone(),
    ));

    tracing::info!(
        queue = %state.queue.name(),
        max_workers = pool_config.max_workers,
        listen = state.db.is_some(),
        "Starting resize worker pool"
    );

    WorkerPool::start(state.queue.clone(), handler, pool_config, state.db.clone())
}
