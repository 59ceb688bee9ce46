//! Failure taxonomy of the image pipeline.
//!
//! Every stage (intake, queue, worker, record update) reports failures as a
//! `PipelineError`. The worker uses [`PipelineError::is_recoverable`] to decide
//! between retrying a job and failing it for good.

use crate::models::owner::OwnerEntityType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Input rejected before any side effect (bad id, no usable file, ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The staged original is missing from the object store.
    #[error("Source object not found: {0}")]
    SourceNotFound(String),

    #[error("{entity} not found: {id}")]
    OwnerNotFound { entity: OwnerEntityType, id: String },

    /// Object store or database call failed in a way that may succeed later.
    #[error("Transient store failure: {0}")]
    TransientStore(String),

    /// Bytes could not be decoded or encoded as an image.
    #[error("Image decode failed: {0}")]
    Decode(String),

    /// The owner record changed between read and write more times than allowed.
    #[error("Concurrent update of {entity} {id}")]
    ConcurrencyConflict { entity: OwnerEntityType, id: String },
}

impl PipelineError {
    /// Whether retrying the whole job may succeed.
    ///
    /// A missing source is retried too: the original may still be propagating
    /// in an eventually consistent store. The attempt budget bounds it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceNotFound(_)
                | PipelineError::TransientStore(_)
                | PipelineError::ConcurrencyConflict { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::SourceNotFound(_) => "source_not_found",
            PipelineError::OwnerNotFound { .. } => "owner_not_found",
            PipelineError::TransientStore(_) => "transient_store",
            PipelineError::Decode(_) => "decode",
            PipelineError::ConcurrencyConflict { .. } => "concurrency_conflict",
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::TransientStore(format!("database: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds() {
        assert!(PipelineError::TransientStore("timeout".into()).is_recoverable());
        assert!(PipelineError::SourceNotFound("k".into()).is_recoverable());
        assert!(PipelineError::ConcurrencyConflict {
            entity: OwnerEntityType::Dog,
            id: "d1".into(),
        }
        .is_recoverable());

        assert!(!PipelineError::Decode("garbage".into()).is_recoverable());
        assert!(!PipelineError::Validation("bad".into()).is_recoverable());
        assert!(!PipelineError::OwnerNotFound {
            entity: OwnerEntityType::User,
            id: "u1".into(),
        }
        .is_recoverable());
    }

    #[test]
    fn owner_not_found_message() {
        let err = PipelineError::OwnerNotFound {
            entity: OwnerEntityType::Dog,
            id: "rex".into(),
        };
        assert_eq!(err.to_string(), "dog not found: rex");
        assert_eq!(err.kind(), "owner_not_found");
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn database_errors_are_transient() {
        let err = PipelineError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_recoverable());
    }
}
