//! Pawprint image worker
//!
//! Claims upload jobs from the queue and turns each original into its three JPEG
//! renditions. The pool handles claiming, leases and retries; [`ResizeWorker`]
//! does the per-job work.

pub mod context;
pub mod pool;
pub mod resize;

pub use context::JobHandler;
pub use pool::{process_job, JobOutcome, WorkerPool, WorkerPoolConfig, MAX_RETRY_BACKOFF_SECS};
pub use resize::ResizeWorker;
