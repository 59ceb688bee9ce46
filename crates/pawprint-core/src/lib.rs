//! Pawprint Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! the intake API, the job queue and the resize worker.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline_error;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, ImagePipelineConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use pipeline_error::PipelineError;
pub use storage_types::StorageBackend;
