//! # Router Module
//!
//! Maps (classification, metadata, file name, configuration) to a path
//! relative to the destination root.
//!
//! [`route`] is a pure function: it never touches the filesystem. Name
//! collisions are resolved afterwards by [`collision::claim`], which is
//! the only step that looks at disk.
//!
//! ## Layout
//! ```text
//! Images/Originals/{make} - {model}/{YYYY|0000}/{name}
//! Images/Originals/Collections/{name}
//! Images/Exports/{YYYY}/{date} - {HH-MM-SS} -- {make} - {model} -- {stem}.jpg
//! Images/{screenshots}/{name}
//! Videos/[Motion Photos|Short Videos/]{YYYY}/{name}
//! Audios/{category}/{name}
//! Documents/{EXT}/{name}
//! Unknown/{name}
//! {class}/{hidden}/{name}
//! ```

pub mod collision;

pub use collision::{claim, suffixed, ClaimedFile};

use crate::config::{AudioCategory, Configuration};
use crate::core::classifier::{Classification, MediaClass};
use crate::core::exporter;
use crate::core::metadata::ImageMetadata;
use chrono::{DateTime, Datelike, Local};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Folder for images without camera information
pub const COLLECTIONS_DIR: &str = "Collections";
/// Folder for motion photos under the video root
pub const MOTION_PHOTOS_DIR: &str = "Motion Photos";
/// Folder for short videos under the video root
pub const SHORT_VIDEOS_DIR: &str = "Short Videos";
/// Document folder for files without an extension
pub const OTHER_DOCUMENTS_DIR: &str = "Other Documents";
/// Year folder for videos without a usable modification time
pub const UNKNOWN_YEAR: &str = "0000";
/// Last-resort audio folder
pub const FALLBACK_AUDIO_DIR: &str = "Songs";

/// Routing result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Where the original is copied
    pub primary: PathBuf,
    /// Where the JPEG export goes, when one applies
    pub export: Option<PathBuf>,
    /// Breakdown label for reports, e.g. `Videos/Motion Photos`
    pub category: String,
}

/// Inputs to [`route`] that describe one file
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub classification: Classification,
    pub file_name: &'a OsStr,
    pub image: Option<&'a ImageMetadata>,
    pub modified: Option<SystemTime>,
}

/// Compute the destination of one file
pub fn route(config: &Configuration, request: &RouteRequest<'_>) -> Route {
    let dirs = &config.directories;
    let name = request.file_name;
    let flags = request.classification.flags;

    let class_root = match request.classification.class {
        MediaClass::Image => &dirs.images,
        MediaClass::Video => &dirs.videos,
        MediaClass::Audio => &dirs.audios,
        MediaClass::Document => &dirs.documents,
        MediaClass::Unknown => &dirs.unknown,
    };

    if flags.hidden {
        return Route {
            primary: [class_root.as_str(), dirs.hidden.as_str()]
                .iter()
                .collect::<PathBuf>()
                .join(name),
            export: None,
            category: format!("{}/{}", class_root, dirs.hidden),
        };
    }

    match request.classification.class {
        MediaClass::Image => route_image(config, request),
        MediaClass::Video => {
            let year = year_of(request.modified);
            let (sub, category) = if flags.motion_photo {
                (Some(MOTION_PHOTOS_DIR), format!("{}/{}", class_root, MOTION_PHOTOS_DIR))
            } else if flags.short_video {
                (Some(SHORT_VIDEOS_DIR), format!("{}/{}", class_root, SHORT_VIDEOS_DIR))
            } else {
                (None, class_root.clone())
            };
            let mut primary = PathBuf::from(class_root);
            if let Some(sub) = sub {
                primary.push(sub);
            }
            primary.push(year);
            primary.push(name);
            Route {
                primary,
                export: None,
                category,
            }
        }
        MediaClass::Audio => {
            let lower_name = name.to_string_lossy().to_lowercase();
            let ext = dotted_extension(name);
            let folder = resolve_audio_category(config, &ext, &lower_name)
                .map(|c| c.folder_name.as_str())
                .unwrap_or(FALLBACK_AUDIO_DIR);
            Route {
                primary: Path::new(class_root).join(folder).join(name),
                export: None,
                category: format!("{}/{}", class_root, folder),
            }
        }
        MediaClass::Document => {
            let ext = Path::new(name)
                .extension()
                .map(|e| e.to_string_lossy().to_uppercase())
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| OTHER_DOCUMENTS_DIR.to_string());
            let ext = sanitize_segment(&ext);
            Route {
                primary: Path::new(class_root).join(&ext).join(name),
                export: None,
                category: format!("{}/{}", class_root, ext),
            }
        }
        MediaClass::Unknown => Route {
            primary: Path::new(class_root).join(name),
            export: None,
            category: class_root.clone(),
        },
    }
}

fn route_image(config: &Configuration, request: &RouteRequest<'_>) -> Route {
    let dirs = &config.directories;
    let image_dirs = &config.image_dirs;
    let name = request.file_name;
    let images = Path::new(&dirs.images);

    if request.classification.flags.screenshot {
        let folder = &config.screenshots.folder_name;
        return Route {
            primary: images.join(folder).join(name),
            export: None,
            category: format!("{}/{}", dirs.images, folder),
        };
    }

    let empty = ImageMetadata::default();
    let meta = request.image.unwrap_or(&empty);
    let camera = meta
        .camera()
        .map(|(make, model)| (sanitize_segment(make), sanitize_segment(model)));
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let originals = images.join(&image_dirs.originals);
    let exports = images.join(&image_dirs.exports);

    let (primary, export) = match (&camera, meta.capture_time) {
        (Some((make, model)), Some(taken)) => {
            let year = format!("{:04}", taken.year());
            let camera_dir = format!("{} - {}", make, model);
            let export_name = format!(
                "{} - {} -- {} - {} -- {}.jpg",
                taken.format("%Y-%m-%d"),
                taken.format("%H-%M-%S"),
                make,
                model,
                stem
            );
            (
                originals.join(camera_dir).join(&year).join(name),
                exports.join(&year).join(export_name),
            )
        }
        (Some((make, model)), None) => {
            let camera_dir = format!("{} - {}", make, model);
            let export_name = format!("{} - {} -- {}.jpg", make, model, stem);
            (
                originals
                    .join(camera_dir)
                    .join(&image_dirs.no_exif_year_folder)
                    .join(name),
                exports.join(&image_dirs.no_exif_year_folder).join(export_name),
            )
        }
        (None, _) => (
            originals.join(COLLECTIONS_DIR).join(name),
            exports.join(COLLECTIONS_DIR).join(format!("{}.jpg", stem)),
        ),
    };

    let exportable = config.processing.enable_image_exports
        && exporter::is_exportable(&dotted_extension(name));

    Route {
        primary,
        export: exportable.then_some(export),
        category: dirs.images.clone(),
    }
}

/// Pick the audio category for a file.
///
/// Strict order: extension and pattern both match; extension matches a
/// category without patterns; any pattern matches; the `songs` category;
/// the first category. `None` means no categories are configured.
pub fn resolve_audio_category<'c>(
    config: &'c Configuration,
    dotted_ext: &str,
    lower_name: &str,
) -> Option<&'c AudioCategory> {
    let categories = &config.audio_categories;
    categories
        .iter()
        .map(|(_, c)| c)
        .find(|c| c.has_extension(dotted_ext) && !c.patterns.is_empty() && c.matches_name(lower_name))
        .or_else(|| {
            categories
                .iter()
                .map(|(_, c)| c)
                .find(|c| c.has_extension(dotted_ext) && c.patterns.is_empty())
        })
        .or_else(|| {
            categories
                .iter()
                .map(|(_, c)| c)
                .find(|c| c.matches_name(lower_name))
        })
        .or_else(|| categories.get("songs"))
        .or_else(|| categories.first())
}

/// Four-digit year of a modification time, or `0000`
pub fn year_of(modified: Option<SystemTime>) -> String {
    match modified {
        Some(time) if time > UNIX_EPOCH => {
            format!("{:04}", DateTime::<Local>::from(time).year())
        }
        _ => UNKNOWN_YEAR.to_string(),
    }
}

/// Lowercase extension including the dot, or empty
fn dotted_extension(name: &OsStr) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Make a metadata value safe to use as one path segment
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "_".to_string()
    } else {
        cleaned
    }
}
