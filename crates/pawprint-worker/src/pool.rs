//! Worker pool: LISTEN/NOTIFY or polling, lease heartbeat, retry, and the
//! expired-lease reaper.
//!
//! Shutdown: [`WorkerPool::shutdown`] stops claiming, then waits up to
//! `shutdown_grace` for in-flight jobs. Jobs still running after that keep their
//! lease until it expires and are redelivered to another worker.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pawprint_core::models::UploadJob;
use pawprint_core::Config;
use pawprint_db::{JobQueue, JOB_NOTIFY_CHANNEL};

use crate::context::JobHandler;

/// Maximum delay in seconds before a failed job is redelivered.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Backoff in seconds after the given delivery attempt (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempts: i32) -> u64 {
    2_u64
        .saturating_pow(attempts.max(0) as u32)
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    /// Upper bound on one handler run. A timeout counts as a recoverable failure.
    pub job_timeout: Duration,
    /// `None` disables the expired-lease reaper.
    pub reap_interval: Option<Duration>,
    pub max_retry_backoff: Duration,
    pub shutdown_grace: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval: Duration::from_millis(1000),
            visibility_timeout: Duration::from_secs(300),
            job_timeout: Duration::from_secs(600),
            reap_interval: Some(Duration::from_secs(60)),
            max_retry_backoff: Duration::from_secs(MAX_RETRY_BACKOFF_SECS),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    pub fn from_config(config: &Config) -> Self {
        let visibility_timeout = Duration::from_secs(config.job_visibility_timeout_secs());
        let reap_secs = config.job_reap_interval_secs();
        Self {
            max_workers: config.worker_max_concurrency(),
            poll_interval: Duration::from_millis(config.worker_poll_interval_ms()),
            visibility_timeout,
            job_timeout: visibility_timeout * 2,
            reap_interval: (reap_secs > 0).then(|| Duration::from_secs(reap_secs)),
            ..Self::default()
        }
    }

    /// How often a held lease is extended: three times per visibility window.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.visibility_timeout / 3).max(Duration::from_millis(100))
    }

    fn retry_delay(&self, attempts: i32) -> Duration {
        Duration::from_secs(compute_retry_backoff_seconds(attempts)).min(self.max_retry_backoff)
    }
}

/// How one delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Nacked; the job becomes visible again after `delay`.
    Retrying { delay: Duration },
    Failed,
    /// The lease expired and the job belongs to a newer delivery. Nothing was recorded.
    LeaseLost,
}

pub struct WorkerPool {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn the pool.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake immediately
    /// when jobs are enqueued, in addition to polling at `poll_interval`.
    pub fn start(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerPoolConfig,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(queue, handler, config, pool, shutdown.clone()));
        Self { shutdown, handle }
    }

    /// Stop claiming and wait (bounded) for in-flight jobs.
    pub async fn shutdown(self) {
        tracing::info!("Initiating worker pool shutdown");
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Worker pool task ended abnormally");
        }
    }
}

async fn run(
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerPoolConfig,
    pool: Option<sqlx::PgPool>,
    shutdown: CancellationToken,
) {
    tracing::info!(
        queue = queue.name(),
        max_workers = config.max_workers,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        visibility_timeout_secs = config.visibility_timeout.as_secs(),
        listen_notify = pool.is_some(),
        "Worker pool started"
    );

    let semaphore = Arc::new(Semaphore::new(config.max_workers));

    let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
    if let Some(pool) = pool {
        spawn_listener(pool, notify_tx.clone(), shutdown.clone());
    }
    if let Some(reap_interval) = config.reap_interval {
        spawn_reaper(queue.clone(), reap_interval, shutdown.clone());
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Worker pool shutting down");
                break;
            }
            _ = notify_rx.recv() => {
                claim_and_dispatch(&queue, &handler, &semaphore, &config).await;
            }
            _ = sleep(config.poll_interval) => {
                claim_and_dispatch(&queue, &handler, &semaphore, &config).await;
            }
        }
    }
    drop(notify_tx);

    let all_permits = u32::try_from(config.max_workers).unwrap_or(u32::MAX);
    let drained =
        tokio::time::timeout(config.shutdown_grace, semaphore.acquire_many(all_permits)).await;
    match drained {
        Ok(_) => tracing::info!("Worker pool stopped"),
        Err(_) => tracing::warn!(
            in_flight = config.max_workers - semaphore.available_permits(),
            "Shutdown grace elapsed with jobs in flight; they will be redelivered"
        ),
    }
}

fn spawn_listener(pool: sqlx::PgPool, tx: mpsc::Sender<()>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let listen = async move {
            loop {
                match sqlx::postgres::PgListener::connect_with(&pool).await {
                    Ok(mut listener) => {
                        if let Err(e) = listener.listen(JOB_NOTIFY_CHANNEL).await {
                            tracing::warn!(error = %e, "LISTEN failed, will retry");
                            sleep(LISTEN_RETRY_DELAY).await;
                            continue;
                        }
                        while listener.recv().await.is_ok() {
                            // A full channel already holds a pending wake-up.
                            let _ = tx.try_send(());
                        }
                        tracing::warn!("LISTEN connection lost, reconnecting");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "PgListener connect failed, will retry");
                        sleep(LISTEN_RETRY_DELAY).await;
                    }
                }
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = listen => {}
        }
    });
}

fn spawn_reaper(queue: Arc<dyn JobQueue>, reap_interval: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(reap_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match queue.reap_expired().await {
                        Ok(0) => {}
                        Ok(reaped) => tracing::warn!(
                            reaped = reaped,
                            "Failed jobs whose lease expired on their final attempt"
                        ),
                        Err(e) => tracing::error!(error = %e, "Expired lease reaper failed"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

/// Claim jobs while both jobs and free workers are available.
async fn claim_and_dispatch(
    queue: &Arc<dyn JobQueue>,
    handler: &Arc<dyn JobHandler>,
    semaphore: &Arc<Semaphore>,
    config: &WorkerPoolConfig,
) {
    loop {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match queue.dequeue(config.visibility_timeout).await {
            Ok(Some(job)) => {
                let queue = queue.clone();
                let handler = handler.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = process_job(job, queue, handler, &config).await {
                        tracing::error!(error = %e, "Failed to record job outcome");
                    }
                });
            }
            Ok(None) => {
                tracing::trace!("No jobs available in queue");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim job from queue");
                return;
            }
        }
    }
}

fn spawn_heartbeat(
    queue: Arc<dyn JobQueue>,
    job_id: Uuid,
    lease_id: Uuid,
    config: &WorkerPoolConfig,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let period = config.heartbeat_interval();
    let visibility_timeout = config.visibility_timeout;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    match queue.extend_visibility(job_id, lease_id, visibility_timeout).await {
                        Ok(true) => tracing::trace!(job.id = %job_id, "Job lease extended"),
                        Ok(false) => {
                            tracing::warn!(
                                job.id = %job_id,
                                "Job lease lost, another delivery may be processing it"
                            );
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(job.id = %job_id, error = %e, "Failed to extend job lease")
                        }
                    }
                }
            }
        }
    })
}

/// Run one claimed job to completion and record the outcome on the queue.
///
/// Errors are only returned when the queue itself cannot be updated; handler failures
/// are turned into a retry or a failure.
#[tracing::instrument(
    skip(job, queue, handler, config),
    fields(job.id = %job.id, job.attempt = job.attempts, key = %job.source_key)
)]
pub async fn process_job(
    job: UploadJob,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: &WorkerPoolConfig,
) -> Result<JobOutcome> {
    let Some(lease_id) = job.lease_id else {
        anyhow::bail!("Job {} was delivered without a lease", job.id);
    };
    let start = Instant::now();

    let stop_heartbeat = CancellationToken::new();
    let heartbeat = spawn_heartbeat(
        queue.clone(),
        job.id,
        lease_id,
        config,
        stop_heartbeat.clone(),
    );
    let result = tokio::time::timeout(config.job_timeout, handler.handle(&job)).await;
    stop_heartbeat.cancel();
    let _ = heartbeat.await;

    match result {
        Ok(Ok(renditions)) => {
            let acked = queue
                .ack(job.id, lease_id, &renditions)
                .await
                .context("Failed to mark job as completed")?;
            if !acked {
                tracing::warn!("Lease lost before ack, leaving the job to its current holder");
                return Ok(JobOutcome::LeaseLost);
            }
            tracing::info!(
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Job completed successfully"
            );
            Ok(JobOutcome::Completed)
        }
        Ok(Err(e)) => {
            tracing::error!(
                error = %e,
                error.kind = e.kind(),
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                unrecoverable = !e.is_recoverable(),
                "Job processing failed"
            );
            retry_or_fail(&job, lease_id, &queue, config, e.is_recoverable(), &e.to_string()).await
        }
        Err(_) => {
            tracing::error!(
                timeout_seconds = config.job_timeout.as_secs(),
                "Job processing timed out"
            );
            retry_or_fail(&job, lease_id, &queue, config, true, "processing timed out").await
        }
    }
}

async fn retry_or_fail(
    job: &UploadJob,
    lease_id: Uuid,
    queue: &Arc<dyn JobQueue>,
    config: &WorkerPoolConfig,
    recoverable: bool,
    error: &str,
) -> Result<JobOutcome> {
    if recoverable && job.can_retry() {
        let delay = config.retry_delay(job.attempts);
        tracing::info!(
            attempts = job.attempts,
            backoff_seconds = delay.as_secs(),
            "Scheduling job retry"
        );
        let rescheduled = queue
            .nack(job.id, lease_id, delay, error)
            .await
            .context("Failed to reschedule job")?;
        return Ok(if rescheduled {
            JobOutcome::Retrying { delay }
        } else {
            tracing::warn!("Lease lost before retry could be scheduled");
            JobOutcome::LeaseLost
        });
    }

    let failed = queue
        .fail(job.id, lease_id, error)
        .await
        .context("Failed to mark job as failed")?;
    if !failed {
        tracing::warn!("Lease lost before failure could be recorded");
        return Ok(JobOutcome::LeaseLost);
    }

    if recoverable {
        tracing::error!(attempts = job.attempts, "Job failed after max attempts");
    } else {
        tracing::error!("Job failed with unrecoverable error, will not retry");
    }
    Ok(JobOutcome::Failed)
}
