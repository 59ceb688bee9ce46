pub mod upload;

pub use upload::{IncomingFile, UploadAccepted, UploadIntake};
