//! Upload intake
//!
//! Workflow: check owner → extract files → filter → stage original → enqueue.
//! The caller gets job ids back as soon as every accepted original is stored and its
//! job is queued; resizing happens later in the worker.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use bytes::Bytes;
use pawprint_core::models::{OwnerRef, UploadJobPayload};
use pawprint_core::AppError;
use pawprint_storage::keys::{extension_of, original_key, unique_suffix};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One file part read from the request, not yet validated.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadAccepted {
    /// One job per accepted file, in upload order
    pub job_ids: Vec<Uuid>,
}

pub struct UploadIntake {
    state: Arc<AppState>,
}

impl UploadIntake {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            state: state.clone(),
        }
    }

    /// Fails with `NotFound` unless the owning entity exists.
    pub async fn ensure_owner(&self, owner: &OwnerRef) -> Result<(), AppError> {
        let exists = self
            .state
            .owners
            .records(owner.entity_type())
            .exists(owner.entity_id())
            .await?;

        if !exists {
            return Err(AppError::NotFound(format!(
                "{} not found: {}",
                owner.entity_type(),
                owner.entity_id()
            )));
        }
        Ok(())
    }

    /// Collect the parts sent under the owner's field name. Other fields are skipped.
    pub async fn extract_files(
        &self,
        owner: &OwnerRef,
        mut multipart: Multipart,
    ) -> Result<Vec<IncomingFile>, AppError> {
        let field_name = owner.entity_type().field_name();
        let max_files = self.state.config.max_files_per_request();
        let mut files = Vec::new();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some(field_name) {
                tracing::debug!(field = ?field.name(), "Ignoring multipart field");
                continue;
            }
            if files.len() >= max_files {
                return Err(AppError::BadRequest(format!(
                    "Too many files: at most {} per request",
                    max_files
                )));
            }

            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            let data = field.bytes().await.map_err(multipart_error)?;

            files.push(IncomingFile {
                filename,
                content_type,
                data,
            });
        }

        Ok(files)
    }

    /// Filter the files, then stage and enqueue every accepted one.
    ///
    /// An oversized file rejects the whole request before anything is stored. Files that
    /// are not an allowed image are dropped; if none remain the request is unsupported.
    pub async fn accept(
        &self,
        owner: &OwnerRef,
        files: Vec<IncomingFile>,
    ) -> Result<UploadAccepted, AppError> {
        let field_name = owner.entity_type().field_name();
        if files.is_empty() {
            return Err(AppError::UnsupportedFormat(format!(
                "No file provided in field '{}'",
                field_name
            )));
        }

        let mut accepted = Vec::with_capacity(files.len());
        for file in files {
            match self.state.validator.validate_all(
                &file.filename,
                &file.content_type,
                file.data.len(),
            ) {
                Ok(()) => accepted.push(file),
                Err(e) if e.is_size_violation() => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(
                        filename = %file.filename,
                        content_type = %file.content_type,
                        reason = %e,
                        "Skipping unsupported file"
                    );
                }
            }
        }

        if accepted.is_empty() {
            return Err(AppError::UnsupportedFormat(format!(
                "No supported image in field '{}' (allowed: {})",
                field_name,
                self.state.config.allowed_extensions().join(", ")
            )));
        }

        let mut job_ids = Vec::with_capacity(accepted.len());
        for file in accepted {
            job_ids.push(self.stage(owner, file).await?);
        }

        tracing::info!(owner = %owner, jobs = job_ids.len(), "Upload accepted");
        Ok(UploadAccepted { job_ids })
    }

    /// Store the original, then enqueue its job. A job never points at an unstored key.
    async fn stage(&self, owner: &OwnerRef, file: IncomingFile) -> Result<Uuid, AppError> {
        let key = original_key(owner, &unique_suffix(), &extension_of(&file.filename));
        let size_bytes = file.data.len();

        self.state
            .storage
            .put(&key, file.data, &file.content_type)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let payload = UploadJobPayload::new(owner, key.clone(), file.filename);
        match self.state.queue.enqueue(&payload).await {
            Ok(job_id) => {
                tracing::debug!(
                    job.id = %job_id,
                    key = %key,
                    size_bytes = size_bytes,
                    "Original staged"
                );
                Ok(job_id)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Enqueue failed, removing staged original");
                if let Err(delete_err) = self.state.storage.delete(&key).await {
                    tracing::warn!(key = %key, error = %delete_err, "Failed to remove staged original");
                }
                Err(AppError::InternalWithSource {
                    message: "Failed to enqueue image job".to_string(),
                    source: e,
                })
            }
        }
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::InvalidInput(format!("Failed to read multipart data: {}", err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pawprint_core::models::{JobStatus, OwnerEntityType, RenditionSet, UploadJob};
    use pawprint_core::{Config, ErrorMetadata, ImagePipelineConfig};
    use pawprint_db::{JobQueue, MemoryJobQueue, MemoryOwnerRecords, OwnerRegistry};
    use pawprint_storage::MemoryStorage;
    use std::time::Duration;

    struct Fixture {
        intake: UploadIntake,
        storage: MemoryStorage,
        queue: Arc<MemoryJobQueue>,
        _dogs: MemoryOwnerRecords,
    }

    async fn fixture() -> Fixture {
        let config = Config::new(ImagePipelineConfig {
            max_file_size_bytes: 1024,
            ..Default::default()
        });
        let storage = MemoryStorage::new();
        let queue = Arc::new(MemoryJobQueue::new("imageQueue", 5));
        let (owners, _users, dogs) = OwnerRegistry::memory();
        dogs.insert("d1").await;
        let state = Arc::new(AppState::new(
            config,
            Arc::new(storage.clone()),
            queue.clone(),
            owners,
            None,
        ));
        Fixture {
            intake: UploadIntake::new(&state),
            storage,
            queue,
            _dogs: dogs,
        }
    }

    fn dog() -> OwnerRef {
        OwnerRef::new(OwnerEntityType::Dog, "d1").unwrap()
    }

    fn file(filename: &str, content_type: &str, len: usize) -> IncomingFile {
        IncomingFile {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            data: Bytes::from(vec![7u8; len]),
        }
    }

    #[tokio::test]
    async fn stages_original_then_enqueues() {
        let f = fixture().await;
        let accepted = f
            .intake
            .accept(&dog(), vec![file("Rex.JPG", "image/jpeg", 100)])
            .await
            .unwrap();

        assert_eq!(accepted.job_ids.len(), 1);
        let jobs = f.queue.jobs().await;
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.id, accepted.job_ids[0]);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.original_filename, "Rex.JPG");
        assert!(job.source_key.starts_with("dogs/d1/"));
        assert!(job.source_key.ends_with(".jpg"));
        assert!(f.storage.has_object(&job.source_key));
    }

    #[tokio::test]
    async fn unsupported_files_are_dropped() {
        let f = fixture().await;
        let accepted = f
            .intake
            .accept(
                &dog(),
                vec![
                    file("notes.txt", "text/plain", 10),
                    file("rex.png", "image/png", 10),
                    file("empty.gif", "image/gif", 0),
                    file("lying.png", "image/jpeg", 10),
                ],
            )
            .await
            .unwrap();

        assert_eq!(accepted.job_ids.len(), 1);
        assert_eq!(f.storage.len(), 1);
        assert!(f.storage.keys()[0].ends_with(".png"));
    }

    #[tokio::test]
    async fn nothing_acceptable_is_unsupported_format() {
        let f = fixture().await;
        let err = f
            .intake
            .accept(&dog(), vec![file("clip.mp4", "video/mp4", 10)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));

        let err = f.intake.accept(&dog(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
        assert!(f.storage.is_empty());
        assert!(f.queue.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn oversized_file_rejects_whole_request() {
        let f = fixture().await;
        let err = f
            .intake
            .accept(
                &dog(),
                vec![
                    file("small.jpg", "image/jpeg", 10),
                    file("huge.jpg", "image/jpeg", 2048),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        assert!(f.storage.is_empty());
        assert!(f.queue.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn missing_owner_is_not_found() {
        let f = fixture().await;
        let ghost = OwnerRef::new(OwnerEntityType::Dog, "d404").unwrap();
        let err = f.intake.ensure_owner(&ghost).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        f.intake.ensure_owner(&dog()).await.unwrap();
    }

    struct RejectingQueue;

    #[async_trait]
    impl JobQueue for RejectingQueue {
        fn name(&self) -> &str {
            "imageQueue"
        }
        async fn enqueue(&self, _payload: &UploadJobPayload) -> anyhow::Result<Uuid> {
            anyhow::bail!("queue unavailable")
        }
        async fn dequeue(&self, _visibility: Duration) -> anyhow::Result<Option<UploadJob>> {
            Ok(None)
        }
        async fn extend_visibility(
            &self,
            _job_id: Uuid,
            _lease_id: Uuid,
            _visibility: Duration,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn ack(
            &self,
            _job_id: Uuid,
            _lease_id: Uuid,
            _renditions: &RenditionSet,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn nack(
            &self,
            _job_id: Uuid,
            _lease_id: Uuid,
            _delay: Duration,
            _error: &str,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn fail(&self, _job_id: Uuid, _lease_id: Uuid, _error: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn get(&self, _job_id: Uuid) -> anyhow::Result<Option<UploadJob>> {
            Ok(None)
        }
        async fn reap_expired(&self) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn enqueue_failure_removes_staged_original() {
        let storage = MemoryStorage::new();
        let (owners, _users, dogs) = OwnerRegistry::memory();
        dogs.insert("d1").await;
        let state = Arc::new(AppState::new(
            Config::new(ImagePipelineConfig::default()),
            Arc::new(storage.clone()),
            Arc::new(RejectingQueue),
            owners,
            None,
        ));

        let err = UploadIntake::new(&state)
            .accept(&dog(), vec![file("rex.jpg", "image/jpeg", 10)])
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(storage.is_empty());
    }
}
