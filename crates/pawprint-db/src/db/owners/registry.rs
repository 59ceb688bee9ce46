use std::sync::Arc;

use pawprint_core::models::OwnerEntityType;
use sqlx::PgPool;

use super::{DogImageRepository, MemoryOwnerRecords, OwnerImageRecords, UserImageRepository};

/// Routes an [`OwnerEntityType`] to the record store of that variant.
#[derive(Clone)]
pub struct OwnerRegistry {
    users: Arc<dyn OwnerImageRecords>,
    dogs: Arc<dyn OwnerImageRecords>,
}

impl OwnerRegistry {
    pub fn new(users: Arc<dyn OwnerImageRecords>, dogs: Arc<dyn OwnerImageRecords>) -> Self {
        debug_assert_eq!(users.entity_type(), OwnerEntityType::User);
        debug_assert_eq!(dogs.entity_type(), OwnerEntityType::Dog);
        Self { users, dogs }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::new(
            Arc::new(UserImageRepository::new(pool.clone())),
            Arc::new(DogImageRepository::new(pool)),
        )
    }

    /// Registry over fresh in-memory stores, returned alongside them for seeding.
    pub fn memory() -> (Self, MemoryOwnerRecords, MemoryOwnerRecords) {
        let users = MemoryOwnerRecords::new(OwnerEntityType::User);
        let dogs = MemoryOwnerRecords::new(OwnerEntityType::Dog);
        (
            Self::new(Arc::new(users.clone()), Arc::new(dogs.clone())),
            users,
            dogs,
        )
    }

    pub fn records(&self, entity_type: OwnerEntityType) -> &Arc<dyn OwnerImageRecords> {
        match entity_type {
            OwnerEntityType::User => &self.users,
            OwnerEntityType::Dog => &self.dogs,
        }
    }
}
