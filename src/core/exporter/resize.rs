//! SIMD downscaling for exports.

use crate::error::ExportError;
use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbImage;
use std::path::Path;

/// Largest size with the source aspect ratio that fits inside the box.
///
/// Never upscales: sources already inside the box keep their size.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }

    let aspect = width as f64 / height as f64;
    let box_aspect = max_width as f64 / max_height as f64;

    let (w, h) = if aspect > box_aspect {
        (max_width as f64, max_width as f64 / aspect)
    } else {
        (max_height as f64 * aspect, max_height as f64)
    };

    (
        (w.round() as u32).clamp(1, max_width.min(width)),
        (h.round() as u32).clamp(1, max_height.min(height)),
    )
}

/// Reusable RGB resizer. One per worker thread.
pub struct ExportResizer {
    resizer: Resizer,
}

impl ExportResizer {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
        }
    }

    /// Resize `image` to exactly `width` x `height`
    pub fn resize(
        &mut self,
        image: RgbImage,
        width: u32,
        height: u32,
        path: &Path,
    ) -> Result<RgbImage, ExportError> {
        let resize_err = |reason: String| ExportError::Resize {
            path: path.to_path_buf(),
            reason,
        };

        if image.width() == width && image.height() == height {
            return Ok(image);
        }
        if width == 0 || height == 0 {
            return Err(resize_err("Invalid destination dimensions".to_string()));
        }

        let src_image = Image::from_vec_u8(
            image.width(),
            image.height(),
            image.into_raw(),
            PixelType::U8x3,
        )
        .map_err(|e| resize_err(format!("Failed to create source image: {}", e)))?;

        let mut dst_image = Image::new(width, height, PixelType::U8x3);

        let options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));

        self.resizer
            .resize(&src_image, &mut dst_image, &options)
            .map_err(|e| resize_err(format!("Resize failed: {}", e)))?;

        RgbImage::from_raw(width, height, dst_image.into_vec())
            .ok_or_else(|| resize_err("Failed to create result buffer".to_string()))
    }
}

impl Default for ExportResizer {
    fn default() -> Self {
        Self::new()
    }
}
