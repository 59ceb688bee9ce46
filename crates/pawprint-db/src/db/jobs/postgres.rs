use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use pawprint_core::models::{JobStatus, RenditionSet, UploadJob, UploadJobPayload};

use super::{JobQueue, LEASE_EXPIRED_ERROR};

/// Postgres channel notified on every enqueue so idle workers wake up early.
pub const JOB_NOTIFY_CHANNEL: &str = "pawprint_image_job";

const JOB_COLUMNS: &str = r#"
    id,
    queue_name,
    owner_entity_type,
    owner_entity_id,
    source_key,
    original_filename,
    status,
    attempts,
    max_attempts,
    lease_id,
    visible_at,
    last_error,
    rendition_keys,
    created_at,
    updated_at,
    completed_at
"#;

/// Job queue backed by the `upload_jobs` table.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    queue_name: String,
    max_attempts: i32,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, queue_name: impl Into<String>, max_attempts: i32) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
            max_attempts,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn seconds(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

#[async_trait]
impl JobQueue for PgJobQueue {
    fn name(&self) -> &str {
        &self.queue_name
    }

    #[tracing::instrument(skip(self, payload), fields(queue = %self.queue_name, source_key = %payload.source_key))]
    async fn enqueue(&self, payload: &UploadJobPayload) -> Result<Uuid> {
        let job_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO upload_jobs (
                id, queue_name, owner_entity_type, owner_entity_id, source_key,
                original_filename, status, attempts, max_attempts, visible_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, NOW())
            "#,
        )
        .bind(job_id)
        .bind(&self.queue_name)
        .bind(payload.owner_entity_type.to_string())
        .bind(&payload.owner_entity_id)
        .bind(&payload.source_key)
        .bind(&payload.original_filename)
        .bind(JobStatus::Pending.to_string())
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await
        .context("Failed to insert upload job")?;

        // Sent once the row is committed, so a failed notify cannot lose the job.
        // Workers fall back to polling if the notification is lost.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(JOB_NOTIFY_CHANNEL)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
        {
            tracing::warn!(
                error = %e,
                job_id = %job_id,
                "Failed to send pg_notify for new job, workers will discover it via polling"
            );
        }

        tracing::info!(
            job_id = %job_id,
            owner_entity_type = %payload.owner_entity_type,
            owner_entity_id = %payload.owner_entity_id,
            "Upload job enqueued"
        );

        Ok(job_id)
    }

    #[tracing::instrument(skip(self), fields(queue = %self.queue_name))]
    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<UploadJob>> {
        let query = format!(
            r#"
            WITH next AS (
                SELECT id
                FROM upload_jobs
                WHERE queue_name = $1
                    AND status IN ('pending', 'processing')
                    AND visible_at <= NOW()
                    AND attempts < max_attempts
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE upload_jobs
            SET status = 'processing',
                attempts = upload_jobs.attempts + 1,
                lease_id = $2,
                visible_at = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            FROM next
            WHERE upload_jobs.id = next.id
            RETURNING {}
            "#,
            JOB_COLUMNS
                .split(',')
                .map(|c| format!("upload_jobs.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let job = sqlx::query_as::<Postgres, UploadJob>(&query)
            .bind(&self.queue_name)
            .bind(Uuid::new_v4())
            .bind(seconds(visibility_timeout))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to claim next upload job")?;

        if let Some(ref job) = job {
            tracing::debug!(
                job_id = %job.id,
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                "Claimed upload job"
            );
        }

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn extend_visibility(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        visibility_timeout: Duration,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET visible_at = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            WHERE id = $1 AND lease_id = $2 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(lease_id)
        .bind(seconds(visibility_timeout))
        .execute(&self.pool)
        .await
        .context("Failed to extend job visibility")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, renditions))]
    async fn ack(&self, job_id: Uuid, lease_id: Uuid, renditions: &RenditionSet) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'completed',
                rendition_keys = $3,
                lease_id = NULL,
                last_error = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND lease_id = $2 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(lease_id)
        .bind(renditions.keys())
        .execute(&self.pool)
        .await
        .context("Failed to mark job completed")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, error))]
    async fn nack(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'pending',
                lease_id = NULL,
                last_error = $4,
                visible_at = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            WHERE id = $1 AND lease_id = $2 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(lease_id)
        .bind(seconds(delay))
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to schedule job retry")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, error))]
    async fn fail(&self, job_id: Uuid, lease_id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'failed',
                lease_id = NULL,
                last_error = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND lease_id = $2 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(lease_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark job failed")?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, job_id: Uuid) -> Result<Option<UploadJob>> {
        let query = format!("SELECT {} FROM upload_jobs WHERE id = $1", JOB_COLUMNS);
        let job = sqlx::query_as::<Postgres, UploadJob>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch upload job")?;

        Ok(job)
    }

    #[tracing::instrument(skip(self), fields(queue = %self.queue_name))]
    async fn reap_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'failed',
                lease_id = NULL,
                last_error = CASE
                    WHEN last_error IS NULL THEN $2
                    ELSE last_error || '; ' || $2
                END,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE queue_name = $1
                AND status = 'processing'
                AND visible_at <= NOW()
                AND attempts >= max_attempts
            "#,
        )
        .bind(&self.queue_name)
        .bind(LEASE_EXPIRED_ERROR)
        .execute(&self.pool)
        .await
        .context("Failed to reap expired jobs")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count = count, "Failed upload jobs whose final lease expired");
        }

        Ok(count)
    }
}
