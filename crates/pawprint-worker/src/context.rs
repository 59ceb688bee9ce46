//! Job handler trait
//!
//! The pool owns delivery (leases, ack, retry); a handler only turns one claimed job
//! into its rendition keys. Handlers must tolerate being called again for the same
//! job after a redelivery.

use async_trait::async_trait;

use pawprint_core::models::{RenditionSet, UploadJob};
use pawprint_core::PipelineError;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process one delivery. The returned error's recoverability decides between
    /// retry and failure.
    async fn handle(&self, job: &UploadJob) -> Result<RenditionSet, PipelineError>;
}
