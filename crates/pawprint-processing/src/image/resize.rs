use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Fit-to-box resize operations
pub struct ImageResize;

impl ImageResize {
    /// Largest size with the original aspect ratio that fits in a `max_side` square.
    ///
    /// Images already inside the box keep their size; nothing is ever enlarged.
    pub fn fit_within(orig_width: u32, orig_height: u32, max_side: u32) -> (u32, u32) {
        if orig_width <= max_side && orig_height <= max_side {
            return (orig_width, orig_height);
        }

        let longest = orig_width.max(orig_height) as u64;
        let scale = |side: u32| -> u32 {
            let scaled = (side as u64 * max_side as u64 + longest / 2) / longest;
            (scaled as u32).clamp(1, max_side)
        };

        (scale(orig_width), scale(orig_height))
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> FilterType {
        let width_ratio = orig_width as f32 / new_width as f32;
        let height_ratio = orig_height as f32 / new_height as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }

    /// Shrink `img` to fit a `max_side` square.
    pub fn fit_image(img: &DynamicImage, max_side: u32) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let (width, height) = Self::fit_within(orig_width, orig_height, max_side);
        if (width, height) == (orig_width, orig_height) {
            return img.clone();
        }

        let filter = Self::select_filter(orig_width, orig_height, width, height);
        img.resize_exact(width, height, filter)
    }
}
