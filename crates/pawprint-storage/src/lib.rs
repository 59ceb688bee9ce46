//! Pawprint Storage Library
//!
//! Object store gateway for the image pipeline: the `Storage` trait and its S3,
//! local filesystem and in-memory implementations.
//!
//! # Storage key format
//!
//! - **Originals**: `{field}/{owner_id}/{suffix}{ext}`
//! - **Renditions**: `{field}/{owner_id}/{suffix}/{size_dir}/{suffix}{size_suffix}`
//!
//! `field` is `users` or `dogs`. Keys must not contain `..` or a leading `/`. Key
//! generation is centralized in the `keys` module so intake and workers agree.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::SourceKey;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use pawprint_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
