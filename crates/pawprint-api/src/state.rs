//! Application state shared by every handler.

use pawprint_core::Config;
use pawprint_db::{JobQueue, OwnerRegistry};
use pawprint_processing::UploadValidator;
use pawprint_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub queue: Arc<dyn JobQueue>,
    pub owners: OwnerRegistry,
    pub validator: UploadValidator,
    /// Absent when the app runs against in-memory stores; health checks then skip the database.
    pub db: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        queue: Arc<dyn JobQueue>,
        owners: OwnerRegistry,
        db: Option<PgPool>,
    ) -> Self {
        let validator = UploadValidator::from_config(&config);
        Self {
            config,
            storage,
            queue,
            owners,
            validator,
            db,
        }
    }
}
