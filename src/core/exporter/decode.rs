//! Image decoding with a fast JPEG path.
//!
//! JPEG goes through zune-jpeg; everything else, and any JPEG zune
//! rejects, goes through the image crate with format sniffing.

use crate::error::ExportError;
use image::{DynamicImage, ImageBuffer, ImageReader, Luma, Rgb, Rgba};
use std::io::Cursor;
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// Whether the bytes start with a JPEG SOI marker
pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8])
}

/// Decode an in-memory image. `path` is only used for error reporting.
pub fn decode(bytes: &[u8], path: &Path) -> Result<DynamicImage, ExportError> {
    if is_jpeg(bytes) {
        decode_jpeg(bytes, path).or_else(|_| decode_fallback(bytes, path))
    } else {
        decode_fallback(bytes, path)
    }
}

fn decode_jpeg(bytes: &[u8], path: &Path) -> Result<DynamicImage, ExportError> {
    let decode_err = |reason: String| ExportError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);

    let pixels = decoder
        .decode()
        .map_err(|e| decode_err(format!("zune-jpeg decode failed: {:?}", e)))?;

    let info = decoder
        .info()
        .ok_or_else(|| decode_err("Failed to get image info".to_string()))?;
    let width = info.width as u32;
    let height = info.height as u32;

    let image = match decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB) {
        ColorSpace::RGB => {
            let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, pixels)
                    .ok_or_else(|| decode_err("Failed to create RGB buffer".to_string()))?;
            DynamicImage::ImageRgb8(buffer)
        }
        ColorSpace::RGBA => {
            let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, pixels)
                    .ok_or_else(|| decode_err("Failed to create RGBA buffer".to_string()))?;
            DynamicImage::ImageRgba8(buffer)
        }
        ColorSpace::Luma => {
            let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, pixels)
                    .ok_or_else(|| decode_err("Failed to create Luma buffer".to_string()))?;
            DynamicImage::ImageLuma8(buffer)
        }
        other => {
            return Err(decode_err(format!("Unsupported colorspace {:?}", other)));
        }
    };

    Ok(image)
}

fn decode_fallback(bytes: &[u8], path: &Path) -> Result<DynamicImage, ExportError> {
    let decode_err = |reason: String| ExportError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))
}
