pub mod job;
pub mod owner;
pub mod rendition;

pub use job::{JobStatus, UploadJob, UploadJobPayload, DEFAULT_QUEUE_NAME};
pub use owner::{OwnerEntityType, OwnerImages, OwnerRef};
pub use rendition::{ImageSet, RenditionSet, SizeClass};
