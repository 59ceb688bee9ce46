//! Image decoding, fit-to-box resizing and JPEG rendition encoding

pub mod renditions;
pub mod resize;

pub use renditions::{decode_image, encode_jpeg, render_renditions, RenderedRendition};
pub use resize::ImageResize;
