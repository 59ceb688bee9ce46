use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// In-process object store.
///
/// Used when `STORAGE_BACKEND=memory` and by tests. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Bytes>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Bytes>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_object(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.read().get(key).cloned()
    }

    /// Stored keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.object(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        let size = data.len();
        self.write().insert(key.to_string(), data);
        tracing::debug!(key = %key, size_bytes = size, "Memory storage upload successful");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.write().remove(key);
        Ok(())
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("memory://{}?expires_in={}", key, expires_in.as_secs()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.has_object(key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_objects() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();

        storage
            .put("users/u1/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();

        assert!(clone.has_object("users/u1/a.png"));
        assert_eq!(clone.get("users/u1/a.png").await.unwrap(), Bytes::from_static(b"png"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let storage = MemoryStorage::new();
        storage
            .put("dogs/d1/a.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();

        storage.delete("dogs/d1/a.jpg").await.unwrap();
        storage.delete("dogs/d1/a.jpg").await.unwrap();

        assert!(storage.is_empty());
        assert!(storage.get("dogs/d1/a.jpg").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn presign_embeds_ttl() {
        let storage = MemoryStorage::new();
        let url = storage
            .presign("dogs/d1/a.jpg", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(url, "memory://dogs/d1/a.jpg?expires_in=3600");
    }
}
