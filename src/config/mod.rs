//! # Config Module
//!
//! The configuration record every run is driven by.
//!
//! ## File Format
//! Pretty-printed JSON stored as `zensort-config.json` in the destination
//! root. Every section is optional: missing keys take their defaults and
//! unknown keys are ignored. The effective configuration is written back
//! on the first run against a destination.
//!
//! ## Ordering
//! `audio_categories` keeps document order. Audio routing walks the
//! categories in that order, so reordering the file changes placement.

use crate::error::ConfigError;
use globset::Glob;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the effective configuration inside the destination root
pub const CONFIG_FILE_NAME: &str = "zensort-config.json";

/// Complete configuration for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub directories: Directories,
    pub image_dirs: ImageDirs,
    pub audio_categories: AudioCategories,
    pub skip_files: SkipFiles,
    pub processing: Processing,
    pub motion_photos: MotionPhotos,
    pub screenshots: Screenshots,
}

/// Top-level folder names for each primary class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directories {
    pub images: String,
    pub videos: String,
    pub audios: String,
    pub documents: String,
    pub unknown: String,
    /// Folder used under each class root for dot-files
    pub hidden: String,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            images: "Images".to_string(),
            videos: "Videos".to_string(),
            audios: "Audios".to_string(),
            documents: "Documents".to_string(),
            unknown: "Unknown".to_string(),
            hidden: "Hidden".to_string(),
        }
    }
}

/// Sub-folders of the image tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDirs {
    pub originals: String,
    pub exports: String,
    /// Year folder used when a camera is known but the capture time is not
    pub no_exif_year_folder: String,
}

impl Default for ImageDirs {
    fn default() -> Self {
        Self {
            originals: "Originals".to_string(),
            exports: "Exports".to_string(),
            no_exif_year_folder: "0000".to_string(),
        }
    }
}

/// One audio category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioCategory {
    pub folder_name: String,
    /// Extensions with leading dot, e.g. `.m4a`
    pub extensions: Vec<String>,
    /// Filename substrings, matched case-insensitively
    pub patterns: Vec<String>,
}

impl AudioCategory {
    fn new(folder_name: &str, extensions: &[&str], patterns: &[&str]) -> Self {
        Self {
            folder_name: folder_name.to_string(),
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether `ext` (lowercase, with dot) is listed
    pub fn has_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Whether any pattern occurs in `lower_name`
    pub fn matches_name(&self, lower_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| !p.is_empty() && lower_name.contains(&p.to_lowercase()))
    }
}

/// Audio categories in document order
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCategories(Vec<(String, AudioCategory)>);

impl AudioCategories {
    pub fn new(entries: Vec<(String, AudioCategory)>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AudioCategory)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&AudioCategory> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn first(&self) -> Option<&AudioCategory> {
        self.0.first().map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Default for AudioCategories {
    fn default() -> Self {
        Self(vec![
            (
                "songs".to_string(),
                AudioCategory::new(
                    "Songs",
                    &[".mp3", ".flac", ".wav", ".aac", ".ogg", ".m4a", ".wma"],
                    &[],
                ),
            ),
            (
                "voice_recordings".to_string(),
                AudioCategory::new(
                    "Voice Recordings",
                    &[".m4a", ".wav", ".aac", ".3gp"],
                    &["voice", "memo", "note", "recording", "_rec"],
                ),
            ),
            (
                "call_recordings".to_string(),
                AudioCategory::new(
                    "Call Recordings",
                    &[".m4a", ".wav", ".aac", ".3gp", ".amr"],
                    &["call", "_call", "phone", "tel", "+", "recording"],
                ),
            ),
            (
                "other_audio".to_string(),
                AudioCategory::new(
                    "Other Audio",
                    &[".mp3", ".wav", ".aac", ".ogg", ".wma", ".au", ".aiff"],
                    &["podcast", "audiobook", "lecture", "interview", "meeting"],
                ),
            ),
        ])
    }
}

impl Serialize for AudioCategories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, category) in &self.0 {
            map.serialize_entry(key, category)?;
        }
        map.end()
    }
}

struct AudioCategoriesVisitor;

impl<'de> Visitor<'de> for AudioCategoriesVisitor {
    type Value = AudioCategories;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of audio category keys to categories")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut entries: Vec<(String, AudioCategory)> =
            Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, AudioCategory>()? {
            // Later duplicates replace earlier ones in place
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(AudioCategories(entries))
    }
}

impl<'de> Deserialize<'de> for AudioCategories {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AudioCategoriesVisitor)
    }
}

/// Files and directories the run ignores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipFiles {
    /// Extensions with leading dot, compared case-insensitively
    pub extensions: Vec<String>,
    /// Glob patterns matched against the file name
    pub patterns: Vec<String>,
    /// Substrings of directory names that are never descended into
    pub directories: Vec<String>,
}

impl Default for SkipFiles {
    fn default() -> Self {
        Self {
            extensions: [".tmp", ".temp", ".log", ".cache", ".thumb"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            patterns: ["~*", ".DS_Store", "Thumbs.db", "*.thumb", "*.thumb[0-9]*"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            directories: [".git", ".svn", "node_modules", "zensort-db", "zensort-logs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Processing limits and toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Processing {
    pub max_image_width: u32,
    pub max_image_height: u32,
    /// JPEG quality for exports (1..=100)
    pub jpeg_quality: u8,
    pub enable_image_exports: bool,
    /// Videos shorter than this are filed as short videos. 0 disables.
    pub short_video_threshold_seconds: u64,
    /// Copy buffer size in bytes
    pub buffer_size: usize,
    /// Read buffer size for content digests
    pub hash_chunk_size: usize,
}

impl Default for Processing {
    fn default() -> Self {
        Self {
            max_image_width: 3840,
            max_image_height: 2160,
            jpeg_quality: 85,
            enable_image_exports: true,
            short_video_threshold_seconds: 60,
            buffer_size: 1024 * 1024,
            hash_chunk_size: 64 * 1024,
        }
    }
}

/// Motion photo detection (iPhone Live Photos, Samsung Motion Photos)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionPhotos {
    pub enabled: bool,
    pub extensions: Vec<String>,
    pub iphone_patterns: Vec<String>,
    pub samsung_patterns: Vec<String>,
    pub max_duration_seconds: u64,
}

impl Default for MotionPhotos {
    fn default() -> Self {
        Self {
            enabled: true,
            extensions: vec![".mp4".to_string(), ".mov".to_string()],
            iphone_patterns: vec![
                "live".to_string(),
                "livephoto".to_string(),
                "_live".to_string(),
            ],
            samsung_patterns: vec![
                "motion".to_string(),
                "motionphoto".to_string(),
                "mvimg_".to_string(),
            ],
            max_duration_seconds: 10,
        }
    }
}

/// Screenshot detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Screenshots {
    pub enabled: bool,
    pub patterns: Vec<String>,
    pub extensions: Vec<String>,
    pub folder_name: String,
}

impl Default for Screenshots {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: ["screenshot", "screen shot", "screen_shot", "screencapture", "screen capture"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extensions: vec![".png".to_string(), ".jpg".to_string(), ".jpeg".to_string()],
            folder_name: "Screenshots".to_string(),
        }
    }
}

impl Configuration {
    /// Check every value that would otherwise fail mid-run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.processing;
        if !(1..=100).contains(&p.jpeg_quality) {
            return Err(invalid("processing.jpeg_quality", "must be between 1 and 100"));
        }
        if p.max_image_width == 0 {
            return Err(invalid("processing.max_image_width", "must be greater than 0"));
        }
        if p.max_image_height == 0 {
            return Err(invalid("processing.max_image_height", "must be greater than 0"));
        }
        if p.buffer_size == 0 {
            return Err(invalid("processing.buffer_size", "must be greater than 0"));
        }
        if p.hash_chunk_size == 0 {
            return Err(invalid("processing.hash_chunk_size", "must be greater than 0"));
        }

        let d = &self.directories;
        for (field, name) in [
            ("directories.images", &d.images),
            ("directories.videos", &d.videos),
            ("directories.audios", &d.audios),
            ("directories.documents", &d.documents),
            ("directories.unknown", &d.unknown),
            ("directories.hidden", &d.hidden),
            ("image_dirs.originals", &self.image_dirs.originals),
            ("image_dirs.exports", &self.image_dirs.exports),
            ("image_dirs.no_exif_year_folder", &self.image_dirs.no_exif_year_folder),
            ("screenshots.folder_name", &self.screenshots.folder_name),
        ] {
            check_folder_name(field, name)?;
        }
        for (key, category) in self.audio_categories.iter() {
            check_folder_name(&format!("audio_categories.{}.folder_name", key), &category.folder_name)?;
        }

        for pattern in &self.skip_files.patterns {
            Glob::new(pattern).map_err(|e| ConfigError::Invalid {
                field: "skip_files.patterns".to_string(),
                reason: format!("{:?}: {}", pattern, e),
            })?;
        }

        Ok(())
    }

    /// Load a configuration file, overlaying it on the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Configuration =
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |reason: String| ConfigError::Write {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        fs::write(path, data).map_err(|e| write_err(e.to_string()))
    }

    /// Resolve the effective configuration for a destination.
    ///
    /// An explicit `override_path` must exist. Without one, the
    /// destination's `zensort-config.json` is used when present. In both
    /// cases the effective configuration is written to the destination if
    /// it has none yet. Returns the configuration and the file it came from
    /// (or was written to).
    pub fn load_or_init(
        destination: &Path,
        override_path: Option<&Path>,
    ) -> Result<(Self, PathBuf), ConfigError> {
        let dest_file = destination.join(CONFIG_FILE_NAME);

        let (config, source) = match override_path {
            Some(path) => (Self::load(path)?, path.to_path_buf()),
            None if dest_file.exists() => (Self::load(&dest_file)?, dest_file.clone()),
            None => (Self::default(), dest_file.clone()),
        };

        if !dest_file.exists() {
            config.save(&dest_file)?;
        }

        Ok((config, source))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn check_folder_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(invalid(field, "must be a single folder name"));
    }
    Ok(())
}
