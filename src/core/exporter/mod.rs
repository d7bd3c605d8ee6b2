//! # Exporter Module
//!
//! Bounded-resolution JPEG copies of images, written beside the preserved
//! original.
//!
//! ## Steps
//! 1. Decode (zune-jpeg for JPEG, the image crate otherwise)
//! 2. Downscale to fit the configured box; never upscale
//! 3. Rotate/flip according to EXIF orientation
//! 4. Encode JPEG at the configured quality
//! 5. Splice the source's EXIF APP1 segment back in (best effort)
//!
//! The box is applied to the upright dimensions, so an export never
//! exceeds it even after a 90-degree rotation.

mod decode;
mod exif_segment;
mod resize;

pub use decode::{decode, is_jpeg};
pub use exif_segment::{find_exif_segment, reset_orientation, splice};
pub use resize::{fit_within, ExportResizer};

use crate::config::Processing;
use crate::core::router::claim;
use crate::error::ExportError;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source extensions (lowercase, no dot) that get an export
pub const EXPORT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "bmp", "webp"];

/// Whether a file with this extension gets an export. Accepts `.jpg` or `jpg`.
pub fn is_exportable(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.');
    EXPORT_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// Export parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl ExportSettings {
    /// Quality outside 1..=100 falls back to 85
    pub fn new(max_width: u32, max_height: u32, quality: u8) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
            quality: if (1..=100).contains(&quality) { quality } else { 85 },
        }
    }
}

impl From<&Processing> for ExportSettings {
    fn from(processing: &Processing) -> Self {
        Self::new(
            processing.max_image_width,
            processing.max_image_height,
            processing.jpeg_quality,
        )
    }
}

/// Whether an orientation swaps width and height
pub fn is_transposed(orientation: u16) -> bool {
    matches!(orientation, 5..=8)
}

/// Turn stored pixels into upright pixels for an EXIF orientation.
///
/// Unknown values are treated as 1.
pub fn apply_orientation(image: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Produces export files. Holds a resizer, so keep one per thread.
pub struct Exporter {
    settings: ExportSettings,
    resizer: ExportResizer,
}

impl Exporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self {
            settings,
            resizer: ExportResizer::new(),
        }
    }

    pub fn settings(&self) -> ExportSettings {
        self.settings
    }

    /// Render the export bytes for an encoded source image
    pub fn render(
        &mut self,
        source: &[u8],
        orientation: Option<u16>,
        path: &Path,
    ) -> Result<Vec<u8>, ExportError> {
        let orientation = orientation.unwrap_or(1);
        let image = decode(source, path)?.to_rgb8();

        let (max_w, max_h) = if is_transposed(orientation) {
            (self.settings.max_height, self.settings.max_width)
        } else {
            (self.settings.max_width, self.settings.max_height)
        };
        let (width, height) = fit_within(image.width(), image.height(), max_w, max_h);
        let resized = self.resizer.resize(image, width, height, path)?;

        let upright = apply_orientation(DynamicImage::ImageRgb8(resized), orientation).to_rgb8();

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.settings.quality)
            .encode(
                upright.as_raw(),
                upright.width(),
                upright.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| ExportError::Encode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let spliced = find_exif_segment(source)
            .map(reset_orientation)
            .and_then(|app1| splice(&encoded, &app1));
        match spliced {
            Some(with_exif) => Ok(with_exif),
            None => {
                debug!(path = %path.display(), "Export written without EXIF");
                Ok(encoded)
            }
        }
    }

    /// Export `source` to `root/relative`, suffixing on collision.
    ///
    /// Returns the path actually written, relative to `root`.
    pub fn export(
        &mut self,
        source: &Path,
        orientation: Option<u16>,
        root: &Path,
        relative: &Path,
    ) -> Result<PathBuf, ExportError> {
        let bytes = fs::read(source).map_err(|e| ExportError::Write {
            path: source.to_path_buf(),
            source: e,
        })?;
        let rendered = self.render(&bytes, orientation, source)?;

        let mut claimed = claim(root, relative).map_err(|e| ExportError::Write {
            path: root.join(relative),
            source: e,
        })?;

        if let Err(e) = claimed.file.write_all(&rendered) {
            drop(claimed.file);
            let _ = fs::remove_file(&claimed.absolute);
            return Err(ExportError::Write {
                path: claimed.absolute,
                source: e,
            });
        }

        Ok(claimed.relative)
    }
}
