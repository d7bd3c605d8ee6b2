//! # Classifier Module
//!
//! Assigns every file a primary [`MediaClass`] plus orthogonal flags.
//!
//! ## Rules
//! 1. A name starting with `.` sets `hidden`.
//! 2. The lowercase extension picks the class.
//! 3. Unknown extensions fall back to magic-byte sniffing.
//! 4. Videos may be flagged as motion photos by name, or as short videos
//!    by probed duration. Unknown durations never count as short.
//! 5. Images may be flagged as screenshots by name.

pub mod magic;

use crate::config::Configuration;
use crate::core::metadata::VideoProbe;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "svg", "ico", "raw", "cr2",
    "nef", "arw", "dng", "heic", "heif", "avif",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp", "mpg", "mpeg", "ts", "mts",
    "m2ts",
];
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus", "aiff", "au",
];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "rtf", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp",
    "pages", "numbers", "key", "html", "htm", "md", "tex",
];

/// Primary media class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaClass {
    Image,
    Video,
    Audio,
    Document,
    Unknown,
}

impl MediaClass {
    /// Class for a lowercase extension without the dot
    pub fn from_extension(ext: &str) -> Option<Self> {
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(MediaClass::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(MediaClass::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(MediaClass::Audio)
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            Some(MediaClass::Document)
        } else {
            None
        }
    }

    /// Class for a sniffed MIME type
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            MediaClass::Image
        } else if mime.starts_with("video/") {
            MediaClass::Video
        } else if mime.starts_with("audio/") {
            MediaClass::Audio
        } else if mime.starts_with("text/")
            || ["document", "pdf", "spreadsheet", "presentation"]
                .iter()
                .any(|s| mime.contains(s))
        {
            MediaClass::Document
        } else {
            MediaClass::Unknown
        }
    }
}

impl std::fmt::Display for MediaClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaClass::Image => write!(f, "Image"),
            MediaClass::Video => write!(f, "Video"),
            MediaClass::Audio => write!(f, "Audio"),
            MediaClass::Document => write!(f, "Document"),
            MediaClass::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Secondary tags. Each is only ever set for the class it applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFlags {
    pub hidden: bool,
    pub screenshot: bool,
    pub motion_photo: bool,
    pub short_video: bool,
}

/// Result of classifying one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub class: MediaClass,
    pub flags: ClassFlags,
}

impl Classification {
    pub fn new(class: MediaClass) -> Self {
        Self {
            class,
            flags: ClassFlags::default(),
        }
    }
}

/// Classification plus anything that was downgraded along the way
#[derive(Debug, Clone)]
pub struct Classified {
    pub classification: Classification,
    /// Set when sniffing failed and the file fell back to Unknown
    pub sniff_error: Option<String>,
}

/// Lowercase extension without the dot, or empty
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Lowercase file name, or empty
pub fn lower_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn ext_listed(list: &[String], ext: &str) -> bool {
    list.iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn name_matches(patterns: &[String], lower_name: &str) -> bool {
    patterns
        .iter()
        .any(|p| !p.is_empty() && lower_name.contains(&p.to_lowercase()))
}

/// Classifies files against one configuration
pub struct Classifier<'a> {
    config: &'a Configuration,
    probe: &'a dyn VideoProbe,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a Configuration, probe: &'a dyn VideoProbe) -> Self {
        Self { config, probe }
    }

    /// Classify a file
    pub fn classify(&self, path: &Path) -> Classified {
        let ext = extension_of(path);
        let lower_name = lower_name_of(path);
        let mut sniff_error = None;

        let class = match MediaClass::from_extension(&ext) {
            Some(class) => class,
            None => match magic::sniff_file(path) {
                Ok(Some(mime)) => {
                    debug!(path = %path.display(), mime, "Sniffed unknown extension");
                    MediaClass::from_mime(mime)
                }
                Ok(None) => MediaClass::Unknown,
                Err(e) => {
                    sniff_error = Some(e.to_string());
                    MediaClass::Unknown
                }
            },
        };

        let mut classification = Classification::new(class);
        classification.flags.hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false);

        match class {
            MediaClass::Video => {
                classification.flags.motion_photo = self.is_motion_photo(&ext, &lower_name);
                if !classification.flags.motion_photo {
                    classification.flags.short_video = self.is_short_video(path);
                }
            }
            MediaClass::Image => {
                classification.flags.screenshot = self.is_screenshot(&ext, &lower_name);
            }
            _ => {}
        }

        Classified {
            classification,
            sniff_error,
        }
    }

    fn is_motion_photo(&self, ext: &str, lower_name: &str) -> bool {
        let motion = &self.config.motion_photos;
        motion.enabled
            && ext_listed(&motion.extensions, ext)
            && (name_matches(&motion.iphone_patterns, lower_name)
                || name_matches(&motion.samsung_patterns, lower_name))
    }

    fn is_short_video(&self, path: &Path) -> bool {
        let threshold = self.config.processing.short_video_threshold_seconds;
        if threshold == 0 {
            return false;
        }
        let duration = self.probe.duration(path);
        let short = matches!(duration, Some(d) if d < threshold as f64);
        debug!(
            path = %path.display(),
            ?duration,
            threshold,
            short,
            "Short video decision"
        );
        short
    }

    fn is_screenshot(&self, ext: &str, lower_name: &str) -> bool {
        let screenshots = &self.config.screenshots;
        screenshots.enabled
            && ext_listed(&screenshots.extensions, ext)
            && name_matches(&screenshots.patterns, lower_name)
    }
}
