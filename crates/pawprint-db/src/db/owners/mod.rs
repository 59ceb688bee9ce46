//! Image fields of user and dog records.
//!
//! Each owner variant implements [`OwnerImageRecords`] with a version-checked swap.
//! The provided methods build the read-modify-write on top of it: a record that
//! already holds the target images is left alone, a record already pointing at a
//! later upload is never rolled back, and a lost race is retried once against a
//! fresh read before giving up with `ConcurrencyConflict`.

mod memory;
mod postgres;
mod registry;

pub use memory::MemoryOwnerRecords;
pub use postgres::{DogImageRepository, UserImageRepository};
pub use registry::OwnerRegistry;

use async_trait::async_trait;
use pawprint_core::models::{ImageSet, OwnerEntityType, OwnerImages};
use pawprint_core::PipelineError;

/// Attempts of the read-modify-write loop (first try plus one retry).
const SWAP_ATTEMPTS: usize = 2;

/// Outcome of replacing an owner's images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// The record already held the requested images.
    Unchanged,
    /// The record points at a later upload and was left alone.
    Superseded,
    /// The record was swapped; these keys are no longer referenced by it.
    Replaced { stale_keys: Vec<String> },
}

impl RecordUpdate {
    pub fn stale_keys(&self) -> &[String] {
        match self {
            RecordUpdate::Unchanged | RecordUpdate::Superseded => &[],
            RecordUpdate::Replaced { stale_keys } => stale_keys,
        }
    }
}

#[async_trait]
pub trait OwnerImageRecords: Send + Sync {
    fn entity_type(&self) -> OwnerEntityType;

    async fn exists(&self, entity_id: &str) -> Result<bool, PipelineError>;

    /// Current image fields, or `None` if the record does not exist.
    async fn load_images(&self, entity_id: &str) -> Result<Option<OwnerImages>, PipelineError>;

    /// Replace the image fields if the record is still at `expected_version`.
    /// Returns `false` when the version moved on.
    async fn swap_images(
        &self,
        entity_id: &str,
        expected_version: i64,
        images: Option<&ImageSet>,
    ) -> Result<bool, PipelineError>;

    /// Point the record at a freshly rendered image set.
    async fn apply_rendition_keys(
        &self,
        entity_id: &str,
        images: &ImageSet,
    ) -> Result<RecordUpdate, PipelineError> {
        self.replace_images(entity_id, Some(images)).await
    }

    /// Remove the record's image.
    async fn clear_images(&self, entity_id: &str) -> Result<RecordUpdate, PipelineError> {
        self.replace_images(entity_id, None).await
    }

    async fn replace_images(
        &self,
        entity_id: &str,
        images: Option<&ImageSet>,
    ) -> Result<RecordUpdate, PipelineError> {
        let entity = self.entity_type();

        for attempt in 1..=SWAP_ATTEMPTS {
            let current = self.load_images(entity_id).await?.ok_or_else(|| {
                PipelineError::OwnerNotFound {
                    entity,
                    id: entity_id.to_string(),
                }
            })?;

            let unchanged = match images {
                Some(set) => current.holds(set),
                None => current.is_empty(),
            };
            if unchanged {
                return Ok(RecordUpdate::Unchanged);
            }
            if images.is_some_and(|set| current.supersedes(set)) {
                return Ok(RecordUpdate::Superseded);
            }

            if self
                .swap_images(entity_id, current.version, images)
                .await?
            {
                return Ok(RecordUpdate::Replaced {
                    stale_keys: current.stale_keys(images),
                });
            }

            tracing::debug!(
                entity = %entity,
                entity_id = %entity_id,
                attempt = attempt,
                "Image record changed concurrently"
            );
        }

        Err(PipelineError::ConcurrencyConflict {
            entity,
            id: entity_id.to_string(),
        })
    }
}
