use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use pawprint_core::models::{JobStatus, RenditionSet, UploadJob, UploadJobPayload};

use super::{JobQueue, LEASE_EXPIRED_ERROR};

/// Process-local job queue with the same delivery semantics as [`super::PgJobQueue`].
///
/// Jobs do not survive a restart. Clones share the same jobs.
#[derive(Clone)]
pub struct MemoryJobQueue {
    queue_name: String,
    max_attempts: i32,
    jobs: Arc<Mutex<Vec<UploadJob>>>,
}

impl MemoryJobQueue {
    pub fn new(queue_name: impl Into<String>, max_attempts: i32) -> Self {
        Self {
            queue_name: queue_name.into(),
            max_attempts,
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of every job, in enqueue order.
    pub async fn jobs(&self) -> Vec<UploadJob> {
        self.jobs.lock().await.clone()
    }

    async fn update_leased<F>(&self, job_id: Uuid, lease_id: Uuid, apply: F) -> bool
    where
        F: FnOnce(&mut UploadJob, DateTime<Utc>) + Send,
    {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();
        match jobs.iter_mut().find(|j| {
            j.id == job_id && j.lease_id == Some(lease_id) && j.status == JobStatus::Processing
        }) {
            Some(job) => {
                apply(job, now);
                job.updated_at = now;
                true
            }
            None => false,
        }
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    fn name(&self) -> &str {
        &self.queue_name
    }

    async fn enqueue(&self, payload: &UploadJobPayload) -> Result<Uuid> {
        let now = Utc::now();
        let job = UploadJob {
            id: Uuid::new_v4(),
            queue_name: self.queue_name.clone(),
            owner_entity_type: payload.owner_entity_type,
            owner_entity_id: payload.owner_entity_id.clone(),
            source_key: payload.source_key.clone(),
            original_filename: payload.original_filename.clone(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: self.max_attempts,
            lease_id: None,
            visible_at: now,
            last_error: None,
            rendition_keys: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let id = job.id;
        self.jobs.lock().await.push(job);
        tracing::debug!(job_id = %id, queue = %self.queue_name, "Upload job enqueued");
        Ok(id)
    }

    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<UploadJob>> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();
        let next = jobs.iter_mut().find(|j| {
            matches!(j.status, JobStatus::Pending | JobStatus::Processing)
                && j.visible_at <= now
                && j.attempts < j.max_attempts
        });

        Ok(next.map(|job| {
            job.status = JobStatus::Processing;
            job.attempts += 1;
            job.lease_id = Some(Uuid::new_v4());
            job.visible_at = after(now, visibility_timeout);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn extend_visibility(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        visibility_timeout: Duration,
    ) -> Result<bool> {
        Ok(self
            .update_leased(job_id, lease_id, |job, now| {
                job.visible_at = after(now, visibility_timeout);
            })
            .await)
    }

    async fn ack(&self, job_id: Uuid, lease_id: Uuid, renditions: &RenditionSet) -> Result<bool> {
        let keys = renditions.keys();
        Ok(self
            .update_leased(job_id, lease_id, move |job, now| {
                job.status = JobStatus::Completed;
                job.rendition_keys = keys;
                job.lease_id = None;
                job.last_error = None;
                job.completed_at = Some(now);
            })
            .await)
    }

    async fn nack(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<bool> {
        let error = error.to_string();
        Ok(self
            .update_leased(job_id, lease_id, move |job, now| {
                job.status = JobStatus::Pending;
                job.lease_id = None;
                job.last_error = Some(error);
                job.visible_at = after(now, delay);
            })
            .await)
    }

    async fn fail(&self, job_id: Uuid, lease_id: Uuid, error: &str) -> Result<bool> {
        let error = error.to_string();
        Ok(self
            .update_leased(job_id, lease_id, move |job, now| {
                job.status = JobStatus::Failed;
                job.lease_id = None;
                job.last_error = Some(error);
                job.completed_at = Some(now);
            })
            .await)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<UploadJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .find(|j| j.id == job_id)
            .cloned())
    }

    async fn reap_expired(&self) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();
        let mut count = 0;
        for job in jobs.iter_mut().filter(|j| {
            j.status == JobStatus::Processing && j.visible_at <= now && j.attempts >= j.max_attempts
        }) {
            job.status = JobStatus::Failed;
            job.lease_id = None;
            job.last_error = Some(match job.last_error.take() {
                Some(previous) => format!("{}; {}", previous, LEASE_EXPIRED_ERROR),
                None => LEASE_EXPIRED_ERROR.to_string(),
            });
            job.completed_at = Some(now);
            job.updated_at = now;
            count += 1;
        }
        Ok(count)
    }
}
