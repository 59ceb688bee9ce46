//! Pawprint API library
//!
//! The HTTP surface of the image pipeline. Exposed as a library so the binaries and
//! the integration tests build the same router.

pub mod api_doc;
pub mod error;
pub mod handlers;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::HttpAppError;
pub use setup::{initialize_app, setup_routes};
pub use state::AppState;
