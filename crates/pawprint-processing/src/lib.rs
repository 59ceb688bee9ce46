//! Pawprint image processing
//!
//! Upload validation and rendition rendering. Everything here is CPU-only; the
//! async entry points move the work onto the blocking thread pool.

pub mod image;
pub mod validator;

pub use crate::image::{render_renditions, RenderedRendition};
pub use validator::{UploadValidator, ValidationError};
