//! Integration tests for a full ingest run.
//!
//! These tests drive [`Organizer`] end to end against real directories:
//! - Routing of images, videos, audio, documents and hidden files
//! - Deduplication within a run and across runs
//! - Collision suffixes, export bounds, cancellation

use assert_fs::prelude::*;
use assert_fs::TempDir;
use chrono::{Local, TimeZone};
use filetime::FileTime;
use predicates::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zensort::config::{AudioCategories, AudioCategory, Configuration, CONFIG_FILE_NAME};
use zensort::core::hasher::digest;
use zensort::core::index::INDEX_DIR;
use zensort::core::metadata::{NoProbe, VideoMetadata, VideoProbe};
use zensort::core::reporter::LOG_DIR;
use zensort::events::{Event, EventChannel, FileEvent, RunEvent};
use zensort::{CancellationToken, Organizer, RunResult};

/// Probe that reports the same duration for every file
struct FixedDuration(f64);

impl VideoProbe for FixedDuration {
    fn duration(&self, _path: &Path) -> Option<f64> {
        Some(self.0)
    }

    fn metadata(&self, _path: &Path) -> Option<VideoMetadata> {
        None
    }
}

fn put(root: &TempDir, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = root.path().join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

fn set_mtime(path: &Path, year: i32, month: u32, day: u32) {
    let local = Local.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap();
    let time = FileTime::from_unix_time(local.timestamp(), 0);
    filetime::set_file_mtime(path, time).unwrap();
}

fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 140, 200]));
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
        .encode_image(&img)
        .unwrap();
    buf
}

/// Big-endian TIFF block with Make, Model, Orientation and DateTime in IFD0
fn exif_tiff(make: &str, model: &str, datetime: &str, orientation: u16) -> Vec<u8> {
    let ascii = |s: &str| {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    };
    let values = [ascii(make), ascii(model), ascii(datetime)];
    let data_start = 8 + 2 + 4 * 12 + 4;

    let mut ifd = Vec::new();
    let mut data = Vec::new();
    let mut ascii_entry = |ifd: &mut Vec<u8>, tag: u16, value: &[u8]| {
        ifd.extend_from_slice(&tag.to_be_bytes());
        ifd.extend_from_slice(&2u16.to_be_bytes());
        ifd.extend_from_slice(&(value.len() as u32).to_be_bytes());
        ifd.extend_from_slice(&((data_start + data.len()) as u32).to_be_bytes());
        data.extend_from_slice(value);
        if data.len() % 2 == 1 {
            data.push(0);
        }
    };
    ascii_entry(&mut ifd, 0x010F, &values[0]);
    ascii_entry(&mut ifd, 0x0110, &values[1]);
    ifd.extend_from_slice(&0x0112u16.to_be_bytes());
    ifd.extend_from_slice(&3u16.to_be_bytes());
    ifd.extend_from_slice(&1u32.to_be_bytes());
    ifd.extend_from_slice(&orientation.to_be_bytes());
    ifd.extend_from_slice(&[0, 0]);
    ascii_entry(&mut ifd, 0x0132, &values[2]);

    let mut out = b"MM\x00\x2A".to_vec();
    out.extend_from_slice(&8u32.to_be_bytes());
    out.extend_from_slice(&4u16.to_be_bytes());
    out.extend_from_slice(&ifd);
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&data);
    out
}

fn with_exif(jpeg: &[u8], tiff: &[u8]) -> Vec<u8> {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(tiff);
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

fn organize(source: &TempDir, dest: &TempDir) -> RunResult {
    organize_with(source, dest, Configuration::default(), Box::new(NoProbe))
}

fn organize_with(
    source: &TempDir,
    dest: &TempDir,
    config: Configuration,
    probe: Box<dyn VideoProbe>,
) -> RunResult {
    Organizer::builder()
        .source(source.path())
        .destination(dest.path())
        .config(config)
        .workers(4)
        .probe(probe)
        .build()
        .run()
        .unwrap()
}

/// Organized files below the destination, without index, logs or config
fn library_files(dest: &Path) -> BTreeSet<PathBuf> {
    WalkDir::new(dest)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(dest).unwrap().to_path_buf())
        .filter(|p| {
            !p.starts_with(INDEX_DIR)
                && !p.starts_with(LOG_DIR)
                && p.as_os_str() != CONFIG_FILE_NAME
        })
        .collect()
}

#[test]
fn jpeg_with_exif_is_filed_by_camera_and_year() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let tiff = exif_tiff("SONY", "ILCE-7M3", "2021:06:15 14:22:10", 1);
    put(&source, "DSC01.jpg", &with_exif(&solid_jpeg(120, 80), &tiff));

    let result = organize(&source, &dest);

    assert_eq!(result.summary.accepted, 1);
    dest.child("Images/Originals/SONY - ILCE-7M3/2021/DSC01.jpg")
        .assert(predicate::path::is_file());
    dest.child("Images/Exports/2021/2021-06-15 - 14-22-10 -- SONY - ILCE-7M3 -- DSC01.jpg")
        .assert(predicate::path::is_file());
}

#[test]
fn hidden_file_lands_in_hidden_folder_without_export() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let png = source.path().join(".secret.png");
    image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]))
        .save(&png)
        .unwrap();
    put(&source, "docs/.notes.txt", b"private");

    let first = organize(&source, &dest);
    let second = organize(&source, &dest);

    assert_eq!(first.summary.accepted, 2);
    dest.child("Images/Hidden/.secret.png").assert(predicate::path::is_file());
    dest.child("Documents/Hidden/.notes.txt").assert(predicate::path::is_file());
    dest.child("Images/Exports").assert(predicate::path::missing());
    assert_eq!(second.summary.accepted, 0);
    assert_eq!(second.summary.duplicates, 2);
}

#[test]
fn identical_files_are_copied_once() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let bytes = solid_jpeg(40, 30);
    put(&source, "a/photo.jpg", &bytes);
    put(&source, "b/photo.jpg", &bytes);

    let (sender, receiver) = EventChannel::new();
    let result = Organizer::builder()
        .source(source.path())
        .destination(dest.path())
        .workers(2)
        .probe(Box::new(NoProbe))
        .exports(false)
        .build()
        .run_with_events(&sender)
        .unwrap();
    drop(sender);

    assert_eq!(result.summary.accepted, 1);
    assert_eq!(result.summary.duplicates, 1);

    let events: Vec<Event> = receiver.iter().collect();
    let accepted: Vec<PathBuf> = events
        .iter()
        .filter_map(|e| match e {
            Event::File(FileEvent::Accepted { destination, .. }) => Some(destination.clone()),
            _ => None,
        })
        .collect();
    let existing: Vec<PathBuf> = events
        .iter()
        .filter_map(|e| match e {
            Event::File(FileEvent::Duplicate {
                existing_destination,
                ..
            }) => Some(existing_destination.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(accepted, vec![PathBuf::from("Images/Originals/Collections/photo.jpg")]);
    assert_eq!(existing, accepted);
    assert_eq!(
        library_files(dest.path()),
        BTreeSet::from([PathBuf::from("Images/Originals/Collections/photo.jpg")])
    );
}

#[test]
fn motion_photo_is_filed_by_modification_year() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = put(&source, "MVIMG_20220104.mp4", b"not really an mp4");
    set_mtime(&path, 2022, 1, 4);

    organize(&source, &dest);

    dest.child("Videos/Motion Photos/2022/MVIMG_20220104.mp4")
        .assert(predicate::path::is_file());
}

#[test]
fn probed_short_video_goes_to_short_videos() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = put(&source, "clip.mp4", b"twelve seconds of video");
    set_mtime(&path, 2020, 7, 1);

    organize_with(&source, &dest, Configuration::default(), Box::new(FixedDuration(12.0)));

    dest.child("Videos/Short Videos/2020/clip.mp4")
        .assert(predicate::path::is_file());
}

#[test]
fn video_without_probe_is_not_short() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = put(&source, "clip.mp4", b"twelve seconds of video");
    set_mtime(&path, 2020, 7, 1);

    organize(&source, &dest);

    dest.child("Videos/2020/clip.mp4").assert(predicate::path::is_file());
    dest.child("Videos/Short Videos").assert(predicate::path::missing());
}

#[test]
fn call_recording_matches_its_category() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    put(&source, "Call_+15551234_20230101.m4a", b"audio");
    put(&source, "track01.mp3", b"music");

    let config = Configuration {
        audio_categories: AudioCategories::new(vec![
            (
                "songs".to_string(),
                AudioCategory {
                    folder_name: "Songs".to_string(),
                    extensions: vec![".mp3".to_string(), ".m4a".to_string()],
                    patterns: Vec::new(),
                },
            ),
            (
                "call_recordings".to_string(),
                AudioCategory {
                    folder_name: "Call Recordings".to_string(),
                    extensions: vec![".m4a".to_string()],
                    patterns: vec!["call".to_string(), "+".to_string()],
                },
            ),
        ]),
        ..Configuration::default()
    };
    organize_with(&source, &dest, config, Box::new(NoProbe));

    dest.child("Audios/Call Recordings/Call_+15551234_20230101.m4a")
        .assert(predicate::path::is_file());
    dest.child("Audios/Songs/track01.mp3").assert(predicate::path::is_file());
}

#[test]
fn colliding_names_get_numbered_suffixes() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    for i in 0..4 {
        put(&source, &format!("dir{}/report.pdf", i), format!("%PDF-1.4 v{}", i).as_bytes());
    }

    let result = organize(&source, &dest);

    assert_eq!(result.summary.accepted, 4);
    assert_eq!(
        library_files(dest.path()),
        BTreeSet::from([
            PathBuf::from("Documents/PDF/report.pdf"),
            PathBuf::from("Documents/PDF/report -- 1.pdf"),
            PathBuf::from("Documents/PDF/report -- 2.pdf"),
            PathBuf::from("Documents/PDF/report -- 3.pdf"),
        ])
    );
}

#[test]
fn second_run_changes_nothing() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    put(&source, "a.txt", b"alpha");
    put(&source, "nested/b.pdf", b"%PDF-1.4 beta");
    put(&source, "song.mp3", b"la la");
    put(&source, "pic.jpg", &solid_jpeg(16, 16));

    let first = organize(&source, &dest);
    let after_first = library_files(dest.path());
    let second = organize(&source, &dest);

    assert_eq!(first.summary.accepted, 4);
    assert_eq!(second.summary.accepted, 0);
    assert_eq!(second.summary.duplicates, 4);
    assert_eq!(library_files(dest.path()), after_first);
}

#[test]
fn source_files_are_left_untouched() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let files = [
        put(&source, "one.jpg", &solid_jpeg(32, 32)),
        put(&source, "two.txt", b"two"),
        put(&source, "deep/three.bin", &[7u8; 4096]),
    ];
    let before: Vec<_> = files
        .iter()
        .map(|p| (fs::metadata(p).unwrap().len(), digest(p).unwrap()))
        .collect();

    organize(&source, &dest);

    let after: Vec<_> = files
        .iter()
        .map(|p| (fs::metadata(p).unwrap().len(), digest(p).unwrap()))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn exports_never_exceed_bounds_or_source() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    put(&source, "wide.jpg", &solid_jpeg(400, 100));
    put(&source, "small.jpg", &solid_jpeg(60, 40));

    let mut config = Configuration::default();
    config.processing.max_image_width = 200;
    config.processing.max_image_height = 150;
    organize_with(&source, &dest, config, Box::new(NoProbe));

    let wide = image::image_dimensions(dest.path().join("Images/Exports/Collections/wide.jpg")).unwrap();
    let small = image::image_dimensions(dest.path().join("Images/Exports/Collections/small.jpg")).unwrap();
    assert_eq!(wide, (200, 50));
    assert_eq!(small, (60, 40));
}

#[test]
fn skipped_files_are_counted_not_copied() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    put(&source, "keep.txt", b"keep");
    put(&source, "build.log", b"noise");
    put(&source, ".DS_Store", b"mac");
    put(&source, "node_modules/pkg/readme.md", b"dep");

    let result = organize(&source, &dest);

    assert_eq!(result.summary.accepted, 1);
    assert_eq!(result.summary.skipped, 2);
    assert_eq!(result.summary.total_files, 3);
    assert_eq!(
        library_files(dest.path()),
        BTreeSet::from([PathBuf::from("Documents/TXT/keep.txt")])
    );
}

#[test]
fn destination_inside_source_is_not_reingested() {
    let source = TempDir::new().unwrap();
    put(&source, "a.txt", b"alpha");
    let dest = source.path().join("library");

    let run = || {
        Organizer::builder()
            .source(source.path())
            .destination(&dest)
            .workers(2)
            .probe(Box::new(NoProbe))
            .build()
            .run()
            .unwrap()
    };
    run();
    let second = run();

    assert_eq!(second.summary.total_files, 1);
    assert_eq!(second.summary.duplicates, 1);
}

#[test]
fn reports_are_written_to_log_directory() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    put(&source, "a.txt", b"alpha");

    let result = organize(&source, &dest);

    let paths = result.report_paths.expect("reports written");
    assert!(paths.json.starts_with(dest.path().join(LOG_DIR)));
    let json: serde_json::Value = serde_json::from_slice(&fs::read(&paths.json).unwrap()).unwrap();
    assert_eq!(json["file_counts"]["accepted_files"], 1);
    assert!(predicate::str::starts_with("ZenSort Processing Report")
        .eval(&fs::read_to_string(&paths.text).unwrap()));
}

#[test]
fn cancelled_run_copies_nothing() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    for i in 0..10 {
        put(&source, &format!("{}.txt", i), format!("file {}", i).as_bytes());
    }
    let token = CancellationToken::new();
    token.cancel();

    let (sender, receiver) = EventChannel::new();
    let result = Organizer::builder()
        .source(source.path())
        .destination(dest.path())
        .probe(Box::new(NoProbe))
        .cancellation(token)
        .reports(false)
        .build()
        .run_with_events(&sender)
        .unwrap();
    drop(sender);

    assert!(result.summary.cancelled);
    assert_eq!(result.summary.accepted, 0);
    assert!(library_files(dest.path()).is_empty());
    assert!(receiver
        .iter()
        .any(|e| matches!(e, Event::Run(RunEvent::Cancelled))));
}

#[test]
fn invalid_config_file_fails_the_run() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let config = put(&source, "cfg/bad.json", b"{ not json");

    let result = Organizer::builder()
        .source(source.path())
        .destination(dest.path())
        .config_file(&config)
        .build()
        .run();

    assert!(matches!(result, Err(zensort::ZenSortError::Config(_))));
}
