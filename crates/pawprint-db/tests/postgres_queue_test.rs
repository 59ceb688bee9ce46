//! `PgJobQueue` against a real Postgres: claiming, leases, retries and the reaper.

mod helpers;

use helpers::{dog_payload, setup_test_db};
use pawprint_core::models::{JobStatus, RenditionSet};
use pawprint_db::db::jobs::LEASE_EXPIRED_ERROR;
use pawprint_db::{JobQueue, PgJobQueue, JOB_NOTIFY_CHANNEL};
use sqlx::postgres::PgListener;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

const LONG: Duration = Duration::from_secs(300);

fn renditions() -> RenditionSet {
    RenditionSet {
        thumbnail: "dogs/d1/s/thumbnails/s_thumb.jpg".to_string(),
        medium: "dogs/d1/s/720p/s_720.jpg".to_string(),
        large: "dogs/d1/s/1080p/s_1080.jpg".to_string(),
    }
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_dequeue_is_fifo_and_hides_claimed_jobs() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let first = queue.enqueue(&dog_payload("d1")).await.unwrap();
    let second = queue.enqueue(&dog_payload("d2")).await.unwrap();

    let job = queue.dequeue(LONG).await.unwrap().unwrap();
    assert_eq!(job.id, first);
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.attempts, 1);
    assert!(job.lease_id.is_some());
    assert!(job.visible_at > job.updated_at + chrono::Duration::seconds(250));

    assert_eq!(queue.dequeue(LONG).await.unwrap().unwrap().id, second);
    assert!(queue.dequeue(LONG).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_queues_are_partitioned_by_name() {
    let db = setup_test_db().await;
    let images = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let other = PgJobQueue::new(db.pool.clone(), "otherQueue", 3);
    images.enqueue(&dog_payload("d1")).await.unwrap();

    assert!(other.dequeue(LONG).await.unwrap().is_none());
    assert!(images.dequeue(LONG).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_concurrent_claims_never_share_a_job() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    for n in 0..3 {
        queue.enqueue(&dog_payload(&format!("d{}", n))).await.unwrap();
    }

    let (a, b, c) = tokio::join!(queue.dequeue(LONG), queue.dequeue(LONG), queue.dequeue(LONG));
    let mut claimed: Vec<Uuid> = [a, b, c]
        .into_iter()
        .filter_map(|job| job.unwrap().map(|job| job.id))
        .collect();
    assert!(!claimed.is_empty());
    while let Some(job) = queue.dequeue(LONG).await.unwrap() {
        claimed.push(job.id);
    }

    let distinct: HashSet<Uuid> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 3);
    assert_eq!(distinct.len(), 3);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_ack_completes_and_records_keys() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let id = queue.enqueue(&dog_payload("d1")).await.unwrap();
    let job = queue.dequeue(LONG).await.unwrap().unwrap();

    assert!(!queue.ack(id, Uuid::new_v4(), &renditions()).await.unwrap());
    assert!(queue.ack(id, job.lease_id.unwrap(), &renditions()).await.unwrap());

    let stored = queue.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.rendition_keys, renditions().keys());
    assert!(stored.lease_id.is_none());
    assert!(stored.completed_at.is_some());
    assert!(queue.dequeue(LONG).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_expired_lease_is_redelivered_and_stale_ack_rejected() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let id = queue.enqueue(&dog_payload("d1")).await.unwrap();

    let first = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    let second = queue.dequeue(LONG).await.unwrap().unwrap();
    assert_eq!(second.id, id);
    assert_eq!(second.attempts, 2);
    assert_ne!(first.lease_id, second.lease_id);

    assert!(!queue
        .extend_visibility(id, first.lease_id.unwrap(), LONG)
        .await
        .unwrap());
    assert!(queue
        .extend_visibility(id, second.lease_id.unwrap(), LONG)
        .await
        .unwrap());
    assert!(!queue.ack(id, first.lease_id.unwrap(), &renditions()).await.unwrap());
    assert!(queue.ack(id, second.lease_id.unwrap(), &renditions()).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_nack_delays_redelivery() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let id = queue.enqueue(&dog_payload("d1")).await.unwrap();
    let job = queue.dequeue(LONG).await.unwrap().unwrap();

    assert!(queue
        .nack(id, job.lease_id.unwrap(), LONG, "throttled")
        .await
        .unwrap());
    let stored = queue.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.last_error.as_deref(), Some("throttled"));
    assert!(stored.lease_id.is_none());
    assert!(queue.dequeue(LONG).await.unwrap().is_none());

    let id2 = queue.enqueue(&dog_payload("d2")).await.unwrap();
    let job2 = queue.dequeue(LONG).await.unwrap().unwrap();
    assert_eq!(job2.id, id2);
    assert!(queue
        .nack(id2, job2.lease_id.unwrap(), Duration::ZERO, "retry now")
        .await
        .unwrap());
    let again = queue.dequeue(LONG).await.unwrap().unwrap();
    assert_eq!(again.id, id2);
    assert_eq!(again.attempts, 2);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_fail_is_lease_guarded() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let id = queue.enqueue(&dog_payload("d1")).await.unwrap();
    let job = queue.dequeue(LONG).await.unwrap().unwrap();

    assert!(!queue.fail(id, Uuid::new_v4(), "decode").await.unwrap());
    assert!(queue.fail(id, job.lease_id.unwrap(), "decode").await.unwrap());

    let stored = queue.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("decode"));
    assert!(!queue
        .extend_visibility(id, job.lease_id.unwrap(), LONG)
        .await
        .unwrap());
    assert!(queue.dequeue(Duration::ZERO).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_exhausted_jobs_are_not_redelivered_and_get_reaped() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 1);
    let live = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let id = queue.enqueue(&dog_payload("d1")).await.unwrap();
    let held = live.enqueue(&dog_payload("d2")).await.unwrap();

    queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
    let claimed = live.dequeue(LONG).await.unwrap().unwrap();
    assert_eq!(claimed.id, held);
    assert!(queue.dequeue(LONG).await.unwrap().is_none());

    assert_eq!(queue.reap_expired().await.unwrap(), 1);
    let stored = queue.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some(LEASE_EXPIRED_ERROR));
    assert_eq!(
        live.get(held).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
    assert_eq!(queue.reap_expired().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_enqueue_notifies_after_the_job_is_visible() {
    let db = setup_test_db().await;
    let queue = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    let mut listener = PgListener::connect_with(&db.pool).await.unwrap();
    listener.listen(JOB_NOTIFY_CHANNEL).await.unwrap();

    let id = queue.enqueue(&dog_payload("d1")).await.unwrap();

    let notification = tokio::time::timeout(Duration::from_secs(5), listener.recv())
        .await
        .expect("notification within timeout")
        .unwrap();
    assert_eq!(notification.payload(), id.to_string());

    let other = PgJobQueue::new(db.pool.clone(), "imageQueue", 3);
    assert_eq!(other.dequeue(LONG).await.unwrap().unwrap().id, id);
}
