//! Durable upload job queue.
//!
//! Delivery is at-least-once. `dequeue` hands out a job together with a fresh
//! `lease_id` and hides it for the visibility timeout; if the holder neither acks,
//! nacks nor fails it before then, the job becomes visible again and is redelivered
//! with a new lease. Every lease-guarded call returns `false` once the lease it
//! carries is no longer current, so a stale worker can never retire a job.

mod memory;
mod postgres;

pub use memory::MemoryJobQueue;
pub use postgres::{PgJobQueue, JOB_NOTIFY_CHANNEL};

use anyhow::Result;
use async_trait::async_trait;
use pawprint_core::models::{RenditionSet, UploadJob, UploadJobPayload};
use std::time::Duration;
use uuid::Uuid;

/// Message recorded on jobs failed by [`JobQueue::reap_expired`].
pub const LEASE_EXPIRED_ERROR: &str = "lease expired after final attempt";

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue name (partition) this handle reads and writes.
    fn name(&self) -> &str;

    /// Add a Pending job, visible immediately. Returns the job id.
    async fn enqueue(&self, payload: &UploadJobPayload) -> Result<Uuid>;

    /// Claim the oldest visible job with attempts left.
    ///
    /// The claimed job is Processing, its `attempts` is incremented and it carries a new
    /// `lease_id`. Expired Processing jobs are eligible again.
    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<UploadJob>>;

    /// Push the visibility deadline of a held job forward.
    async fn extend_visibility(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        visibility_timeout: Duration,
    ) -> Result<bool>;

    /// Processing → Completed, recording the rendition keys.
    async fn ack(&self, job_id: Uuid, lease_id: Uuid, renditions: &RenditionSet) -> Result<bool>;

    /// Processing → Pending, visible again after `delay`.
    async fn nack(&self, job_id: Uuid, lease_id: Uuid, delay: Duration, error: &str)
        -> Result<bool>;

    /// Processing → Failed.
    async fn fail(&self, job_id: Uuid, lease_id: Uuid, error: &str) -> Result<bool>;

    async fn get(&self, job_id: Uuid) -> Result<Option<UploadJob>>;

    /// Fail every Processing job whose lease expired on its final allowed attempt.
    /// Returns how many jobs were failed.
    async fn reap_expired(&self) -> Result<u64>;
}
