use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use pawprint_core::models::{ImageSet, OwnerEntityType, OwnerImages};
use pawprint_core::PipelineError;

use super::OwnerImageRecords;

/// In-memory image fields for one owner variant. Clones share state.
#[derive(Clone)]
pub struct MemoryOwnerRecords {
    entity_type: OwnerEntityType,
    records: Arc<Mutex<HashMap<String, OwnerImages>>>,
}

impl MemoryOwnerRecords {
    pub fn new(entity_type: OwnerEntityType) -> Self {
        Self {
            entity_type,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a record with no image, keeping an existing one untouched.
    pub async fn insert(&self, entity_id: &str) {
        self.records
            .lock()
            .await
            .entry(entity_id.to_string())
            .or_default();
    }

    pub async fn remove(&self, entity_id: &str) {
        self.records.lock().await.remove(entity_id);
    }
}

#[async_trait]
impl OwnerImageRecords for MemoryOwnerRecords {
    fn entity_type(&self) -> OwnerEntityType {
        self.entity_type
    }

    async fn exists(&self, entity_id: &str) -> Result<bool, PipelineError> {
        Ok(self.records.lock().await.contains_key(entity_id))
    }

    async fn load_images(&self, entity_id: &str) -> Result<Option<OwnerImages>, PipelineError> {
        Ok(self.records.lock().await.get(entity_id).cloned())
    }

    async fn swap_images(
        &self,
        entity_id: &str,
        expected_version: i64,
        images: Option<&ImageSet>,
    ) -> Result<bool, PipelineError> {
        let mut records = self.records.lock().await;
        match records.get_mut(entity_id) {
            Some(record) if record.version == expected_version => {
                record.source_key = images.map(|set| set.source_key.clone());
                record.rendition_keys = images
                    .map(|set| set.renditions.keys())
                    .unwrap_or_default();
                record.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::owners::RecordUpdate;
    use pawprint_core::models::RenditionSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image_set(suffix: &str) -> ImageSet {
        ImageSet {
            source_key: format!("dogs/d1/{}.jpg", suffix),
            renditions: RenditionSet {
                thumbnail: format!("dogs/d1/{0}/thumbnails/{0}_thumb.jpg", suffix),
                medium: format!("dogs/d1/{0}/720p/{0}_720.jpg", suffix),
                large: format!("dogs/d1/{0}/1080p/{0}_1080.jpg", suffix),
            },
        }
    }

    #[tokio::test]
    async fn apply_replaces_and_reports_stale_keys() {
        let records = MemoryOwnerRecords::new(OwnerEntityType::Dog);
        records.insert("d1").await;

        let first = image_set("a");
        let update = records.apply_rendition_keys("d1", &first).await.unwrap();
        assert_eq!(update, RecordUpdate::Replaced { stale_keys: vec![] });

        let second = image_set("b");
        let update = records.apply_rendition_keys("d1", &second).await.unwrap();
        assert_eq!(update.stale_keys(), first.all_keys().as_slice());

        let stored = records.load_images("d1").await.unwrap().unwrap();
        assert!(stored.holds(&second));
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn reapplying_same_set_is_unchanged() {
        let records = MemoryOwnerRecords::new(OwnerEntityType::Dog);
        records.insert("d1").await;
        let set = image_set("a");

        records.apply_rendition_keys("d1", &set).await.unwrap();
        let update = records.apply_rendition_keys("d1", &set).await.unwrap();

        assert_eq!(update, RecordUpdate::Unchanged);
        assert_eq!(records.load_images("d1").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn older_upload_does_not_replace_newer() {
        let records = MemoryOwnerRecords::new(OwnerEntityType::Dog);
        records.insert("d1").await;
        let older = image_set("2024-05-01T10_15_30.250Z-11");
        let newer = image_set("2024-05-01T10_15_31.000Z-22");

        records.apply_rendition_keys("d1", &newer).await.unwrap();
        let update = records.apply_rendition_keys("d1", &older).await.unwrap();

        assert_eq!(update, RecordUpdate::Superseded);
        assert!(update.stale_keys().is_empty());
        let stored = records.load_images("d1").await.unwrap().unwrap();
        assert!(stored.holds(&newer));
        assert_eq!(stored.version, 1);

        assert_eq!(records.clear_images("d1").await.unwrap().stale_keys().len(), 4);
    }

    #[tokio::test]
    async fn missing_owner_is_not_found() {
        let records = MemoryOwnerRecords::new(OwnerEntityType::User);
        let err = records
            .apply_rendition_keys("ghost", &image_set("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::OwnerNotFound { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn clear_images_empties_record() {
        let records = MemoryOwnerRecords::new(OwnerEntityType::Dog);
        records.insert("d1").await;
        let set = image_set("a");
        records.apply_rendition_keys("d1", &set).await.unwrap();

        let update = records.clear_images("d1").await.unwrap();
        assert_eq!(update.stale_keys().len(), 4);
        assert!(records.load_images("d1").await.unwrap().unwrap().is_empty());
        assert_eq!(records.clear_images("d1").await.unwrap(), RecordUpdate::Unchanged);
    }

    /// Loses the version race a fixed number of times before delegating.
    struct Contended {
        inner: MemoryOwnerRecords,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl OwnerImageRecords for Contended {
        fn entity_type(&self) -> OwnerEntityType {
            self.inner.entity_type()
        }

        async fn exists(&self, entity_id: &str) -> Result<bool, PipelineError> {
            self.inner.exists(entity_id).await
        }

        async fn load_images(
            &self,
            entity_id: &str,
        ) -> Result<Option<OwnerImages>, PipelineError> {
            self.inner.load_images(entity_id).await
        }

        async fn swap_images(
            &self,
            entity_id: &str,
            expected_version: i64,
            images: Option<&ImageSet>,
        ) -> Result<bool, PipelineError> {
            if self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Ok(false);
            }
            self.inner
                .swap_images(entity_id, expected_version, images)
                .await
        }
    }

    async fn contended(conflicts: usize) -> Contended {
        let inner = MemoryOwnerRecords::new(OwnerEntityType::Dog);
        inner.insert("d1").await;
        Contended {
            inner,
            conflicts: AtomicUsize::new(conflicts),
        }
    }

    #[tokio::test]
    async fn single_conflict_is_retried() {
        let records = contended(1).await;
        let update = records
            .apply_rendition_keys("d1", &image_set("a"))
            .await
            .unwrap();
        assert!(matches!(update, RecordUpdate::Replaced { .. }));
    }

    #[tokio::test]
    async fn second_conflict_is_reported() {
        let records = contended(2).await;
        let err = records
            .apply_rendition_keys("d1", &image_set("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConcurrencyConflict { .. }));
        assert!(err.is_recoverable());
        assert!(records.inner.load_images("d1").await.unwrap().unwrap().is_empty());
    }
}
