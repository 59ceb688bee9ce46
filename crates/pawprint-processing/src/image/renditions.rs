//! Rendition rendering.
//!
//! The original is decoded once. Each size class is then resized and JPEG-encoded
//! from that shared image on its own blocking task, so the three renditions are
//! produced in parallel without stalling the async runtime.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use pawprint_core::models::SizeClass;
use pawprint_core::PipelineError;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::resize::ImageResize;

/// One encoded rendition.
#[derive(Debug, Clone)]
pub struct RenderedRendition {
    pub size: SizeClass,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// Decode image bytes.
///
/// The format is sniffed from the content; the filename extension is only used
/// when sniffing fails.
pub fn decode_image(data: &[u8], filename_hint: &str) -> Result<DynamicImage, PipelineError> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    if reader.format().is_none() {
        if let Some(format) = Path::new(filename_hint)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
        {
            reader.set_format(format);
        }
    }

    reader
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))
}

/// Encode as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes, PipelineError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let (width, height) = rgb.dimensions();
    let mut buffer = Vec::with_capacity((width * height / 4) as usize);
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| PipelineError::Decode(format!("JPEG encoding failed: {}", e)))?;
    Ok(Bytes::from(buffer))
}

fn render_one(
    img: &DynamicImage,
    size: SizeClass,
    quality: u8,
) -> Result<RenderedRendition, PipelineError> {
    let resized = ImageResize::fit_image(img, size.max_dimension());
    let (width, height) = resized.dimensions();
    let data = encode_jpeg(&resized, quality)?;
    Ok(RenderedRendition {
        size,
        width,
        height,
        data,
    })
}

/// Render every [`SizeClass`] from the original's bytes.
///
/// Results are in `SizeClass::ALL` order. Undecodable input yields
/// `PipelineError::Decode`.
pub async fn render_renditions(
    data: Bytes,
    filename_hint: &str,
    quality: u8,
) -> Result<Vec<RenderedRendition>, PipelineError> {
    let start = std::time::Instant::now();
    let hint = filename_hint.to_string();

    let original = tokio::task::spawn_blocking(move || decode_image(&data, &hint))
        .await
        .map_err(|e| PipelineError::Decode(format!("Decode task failed: {}", e)))??;

    let (orig_width, orig_height) = original.dimensions();
    let original = Arc::new(original);

    let tasks = SizeClass::ALL.map(|size| {
        let img = Arc::clone(&original);
        tokio::task::spawn_blocking(move || render_one(&img, size, quality))
    });

    let mut renditions = Vec::with_capacity(tasks.len());
    for joined in futures::future::join_all(tasks).await {
        let rendition = joined
            .map_err(|e| PipelineError::Decode(format!("Resize task failed: {}", e)))??;
        renditions.push(rendition);
    }

    tracing::debug!(
        orig_width = orig_width,
        orig_height = orig_height,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Rendered image renditions"
    );

    Ok(renditions)
}
