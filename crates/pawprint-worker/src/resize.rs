//! Resize job handler.
//!
//! One job: fetch the original, render the three renditions, write them under their
//! deterministic keys, then point the owner record at the new image set. Keys derive
//! from the source key alone, so a redelivered job overwrites the same objects. A job
//! whose upload has been replaced by a later one removes its own objects instead.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use pawprint_core::models::{ImageSet, RenditionSet, UploadJob};
use pawprint_core::{Config, PipelineError};
use pawprint_db::{OwnerRegistry, RecordUpdate};
use pawprint_processing::{render_renditions, RenderedRendition};
use pawprint_storage::{SourceKey, Storage};

use crate::context::JobHandler;

const RENDITION_CONTENT_TYPE: &str = "image/jpeg";

pub struct ResizeWorker {
    storage: Arc<dyn Storage>,
    owners: OwnerRegistry,
    jpeg_quality: u8,
}

impl ResizeWorker {
    pub fn new(storage: Arc<dyn Storage>, owners: OwnerRegistry, jpeg_quality: u8) -> Self {
        Self {
            storage,
            owners,
            jpeg_quality,
        }
    }

    pub fn from_config(config: &Config, storage: Arc<dyn Storage>, owners: OwnerRegistry) -> Self {
        Self::new(storage, owners, config.rendition_jpeg_quality())
    }

    /// Write every rendition. All writes run to completion; the first failure is returned.
    async fn write_renditions(
        &self,
        keys: &RenditionSet,
        rendered: Vec<RenderedRendition>,
    ) -> Result<(), PipelineError> {
        let writes = rendered.into_iter().map(|rendition| {
            let key = keys.key(rendition.size).to_string();
            let storage = self.storage.clone();
            async move {
                let size_bytes = rendition.data.len();
                match storage
                    .put(&key, rendition.data, RENDITION_CONTENT_TYPE)
                    .await
                {
                    Ok(()) => {
                        tracing::debug!(
                            key = %key,
                            size = %rendition.size,
                            width = rendition.width,
                            height = rendition.height,
                            size_bytes = size_bytes,
                            "Rendition written"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Rendition write failed");
                        Err(PipelineError::from(e))
                    }
                }
            }
        });

        join_all(writes).await.into_iter().collect()
    }

    /// Best-effort delete. Failures leave orphans behind but never fail the job.
    async fn delete_keys(&self, keys: &[String], reason: &str) {
        let deletes = keys.iter().map(|key| async move {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(key = %key, error = %e, reason = reason, "Failed to delete object");
            }
        });
        join_all(deletes).await;
    }
}

#[async_trait]
impl JobHandler for ResizeWorker {
    #[tracing::instrument(skip(self, job), fields(job.id = %job.id, owner = %job.owner_entity_id))]
    async fn handle(&self, job: &UploadJob) -> Result<RenditionSet, PipelineError> {
        let owner = job.owner()?;
        let source = SourceKey::parse(&job.source_key)?;
        if source.owner()? != owner {
            return Err(PipelineError::Validation(format!(
                "Source key {} does not belong to {}",
                job.source_key, owner
            )));
        }

        let original = self.storage.get(&job.source_key).await?;
        tracing::debug!(size_bytes = original.len(), "Original fetched");

        let rendered =
            render_renditions(original, &job.original_filename, self.jpeg_quality).await?;

        let renditions = source.renditions();
        self.write_renditions(&renditions, rendered).await?;

        let image_set = ImageSet {
            source_key: job.source_key.clone(),
            renditions: renditions.clone(),
        };
        let update = match self
            .owners
            .records(owner.entity_type())
            .apply_rendition_keys(owner.entity_id(), &image_set)
            .await
        {
            Ok(update) => update,
            Err(e @ PipelineError::OwnerNotFound { .. }) => {
                self.delete_keys(&renditions.keys(), "owner deleted").await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if update == RecordUpdate::Superseded {
            tracing::info!("Owner already holds a later upload, discarding this image set");
            self.delete_keys(&image_set.all_keys(), "superseded").await;
            return Ok(renditions);
        }

        if !update.stale_keys().is_empty() {
            tracing::info!(
                stale = update.stale_keys().len(),
                "Owner image replaced, deleting previous objects"
            );
            self.delete_keys(update.stale_keys(), "replaced").await;
        }

        Ok(renditions)
    }
}
