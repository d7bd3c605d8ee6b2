//! # Metadata Module
//!
//! Reads embedded metadata used for routing.
//!
//! ## Images
//! EXIF camera make and model, capture time, orientation and software.
//! A file without EXIF yields an empty [`ImageMetadata`]. Parsing runs on
//! a helper thread with a wall-clock deadline so a corrupt file cannot
//! stall a worker.
//!
//! ## Videos
//! Container tags come from an external probe (see [`video`]). A missing
//! probe is not an error.

pub mod video;

pub use video::{FfprobeProbe, NoProbe, VideoMetadata, VideoProbe};

use crate::error::MetadataError;
use chrono::NaiveDateTime;
use crossbeam_channel::{bounded, RecvTimeoutError};
use exif::{In, Reader, Tag, Value};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Deadline for EXIF extraction
pub const EXIF_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture-time layouts accepted in EXIF and ISO-style strings
const DATETIME_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y:%m:%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y:%m:%d %H:%M:%SZ",
    "%Y-%m-%d %H:%M:%SZ",
    "%Y:%m:%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%SZ",
];

/// Extracted image metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Camera make (e.g., "SONY"). Present only together with `model`.
    pub make: Option<String>,
    /// Camera model (e.g., "ILCE-7M3"). Present only together with `make`.
    pub model: Option<String>,
    /// Capture time as recorded by the camera (no zone)
    pub capture_time: Option<NaiveDateTime>,
    /// EXIF orientation, 1-8
    pub orientation: Option<u16>,
    pub software: Option<String>,
}

impl ImageMetadata {
    /// Build a record, dropping a make without a model and vice versa
    pub fn new(
        make: Option<String>,
        model: Option<String>,
        capture_time: Option<NaiveDateTime>,
        orientation: Option<u16>,
        software: Option<String>,
    ) -> Self {
        let (make, model) = match (make, model) {
            (Some(make), Some(model)) => (Some(make), Some(model)),
            _ => (None, None),
        };
        Self {
            make,
            model,
            capture_time,
            orientation: orientation.filter(|o| (1..=8).contains(o)),
            software,
        }
    }

    /// Make and model, when both are known
    pub fn camera(&self) -> Option<(&str, &str)> {
        match (&self.make, &self.model) {
            (Some(make), Some(model)) => Some((make, model)),
            _ => None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.make.is_some()
            || self.capture_time.is_some()
            || self.orientation.is_some()
            || self.software.is_some()
    }
}

/// Extract EXIF metadata with the default deadline
pub fn extract_image(path: &Path) -> Result<ImageMetadata, MetadataError> {
    extract_image_with_timeout(path, EXIF_TIMEOUT)
}

/// Extract EXIF metadata, giving up after `timeout`.
///
/// The parse thread is detached on timeout and finishes on its own.
pub fn extract_image_with_timeout(
    path: &Path,
    timeout: Duration,
) -> Result<ImageMetadata, MetadataError> {
    let (tx, rx) = bounded(1);
    let owned: PathBuf = path.to_path_buf();

    thread::Builder::new()
        .name("zensort-exif".to_string())
        .spawn(move || {
            let _ = tx.send(read_exif(&owned));
        })
        .map_err(|e| MetadataError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(MetadataError::Timeout {
            path: path.to_path_buf(),
            seconds: timeout.as_secs(),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(MetadataError::WorkerLost {
            path: path.to_path_buf(),
        }),
    }
}

fn read_exif(path: &Path) -> Result<ImageMetadata, MetadataError> {
    let file = File::open(path).map_err(|e| MetadataError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut bufreader = BufReader::new(&file);
    let exif = match Reader::new().read_from_container(&mut bufreader) {
        Ok(r) => r,
        // No EXIF, or EXIF we cannot read: treat as absent
        Err(_) => return Ok(ImageMetadata::default()),
    };

    let text = |tag: Tag| {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|field| get_string_value(&field.value))
    };

    let capture_time = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .into_iter()
        .filter_map(text)
        .find_map(|s| parse_datetime(&s));

    let orientation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| match field.value {
            Value::Short(ref vec) => vec.first().copied(),
            _ => None,
        });

    Ok(ImageMetadata::new(
        text(Tag::Make),
        text(Tag::Model),
        capture_time,
        orientation,
        text(Tag::Software),
    ))
}

/// Parse a capture time in any accepted layout
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim_end_matches('\0').trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

/// Helper to extract string from EXIF ASCII value
fn get_string_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = value {
        if let Some(bytes) = vec.first() {
            if let Ok(s) = std::str::from_utf8(bytes) {
                let trimmed = s.trim_end_matches('\0').trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-built EXIF payloads for tests.

    /// Build a big-endian TIFF block with Make, Model, Orientation and
    /// DateTime in IFD0.
    pub fn tiff_block(make: &str, model: &str, datetime: &str, orientation: u16) -> Vec<u8> {
        let ascii = |s: &str| {
            let mut v = s.as_bytes().to_vec();
            v.push(0);
            v
        };
        let make = ascii(make);
        let model = ascii(model);
        let datetime = ascii(datetime);

        let entries = 4u16;
        let ifd_len = 2 + entries as usize * 12 + 4;
        let data_start = 8 + ifd_len;

        let mut out = Vec::new();
        out.extend_from_slice(b"MM\x00\x2A");
        out.extend_from_slice(&8u32.to_be_bytes());
        out.extend_from_slice(&entries.to_be_bytes());

        let mut data = Vec::new();
        let push_ascii = |out: &mut Vec<u8>, tag: u16, value: &[u8], data: &mut Vec<u8>| {
            out.extend_from_slice(&tag.to_be_bytes());
            out.extend_from_slice(&2u16.to_be_bytes());
            out.extend_from_slice(&(value.len() as u32).to_be_bytes());
            if value.len() <= 4 {
                let mut inline = value.to_vec();
                inline.resize(4, 0);
                out.extend_from_slice(&inline);
            } else {
                let offset = (data_start + data.len()) as u32;
                out.extend_from_slice(&offset.to_be_bytes());
                data.extend_from_slice(value);
                if data.len() % 2 == 1 {
                    data.push(0);
                }
            }
        };

        // Tags in ascending order
        push_ascii(&mut out, 0x010F, &make, &mut data);
        push_ascii(&mut out, 0x0110, &model, &mut data);
        out.extend_from_slice(&0x0112u16.to_be_bytes());
        out.extend_from_slice(&3u16.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&orientation.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        push_ascii(&mut out, 0x0132, &datetime, &mut data);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&data);
        out
    }

    /// Insert an APP1 Exif segment right after the SOI of `jpeg`
    pub fn with_exif(jpeg: &[u8], tiff: &[u8]) -> Vec<u8> {
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(tiff);
        let len = (payload.len() + 2) as u16;

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    /// Encode a solid-color JPEG of the given size
    pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 80, 40]));
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
            .encode_image(&img)
            .unwrap();
        buf
    }
}
