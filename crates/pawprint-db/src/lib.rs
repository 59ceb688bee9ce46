//! Pawprint persistence layer
//!
//! The durable upload job queue and the image fields of user and dog records, each
//! behind a trait with a Postgres and an in-memory implementation.

pub mod db;

pub use db::jobs::{JobQueue, MemoryJobQueue, PgJobQueue, JOB_NOTIFY_CHANNEL};
pub use db::owners::{
    DogImageRepository, MemoryOwnerRecords, OwnerImageRecords, OwnerRegistry, RecordUpdate,
    UserImageRepository,
};
