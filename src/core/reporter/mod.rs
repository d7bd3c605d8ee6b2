//! # Reporter Module
//!
//! End-of-run reports written to `zensort-logs/`.
//!
//! Each run produces two files with the same timestamp:
//! - `zensort-report_YYYY-MM-DD_HH-MM-SS.json`: the [`RunReport`] record
//! - `zensort-report_YYYY-MM-DD_HH-MM-SS.txt`: a human-readable rendering
//!
//! Errors are grouped by [`ErrorKind`] key with up to three sample paths
//! per group.

mod text;

pub use text::write_text;

use crate::core::index::IndexStats;
use crate::core::progress::ProgressTracker;
use crate::core::router::claim;
use crate::error::{ErrorKind, ReportError};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Directory under the destination root for logs and reports
pub const LOG_DIR: &str = "zensort-logs";

/// Sample paths kept per error group
pub const MAX_ERROR_SAMPLES: usize = 3;

/// Complete record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub session_info: SessionInfo,
    pub file_counts: FileCounts,
    pub size_info: SizeInfo,
    pub category_breakdown: BTreeMap<String, CategoryEntry>,
    pub performance: Performance,
    /// Index totals after the run, if the index could be read
    pub index: Option<IndexStats>,
    pub error_summary: Vec<ErrorGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: String,
    pub duration_ms: u64,
    pub source_directory: PathBuf,
    pub destination_directory: PathBuf,
    pub config_file: PathBuf,
    pub worker_count: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounts {
    pub total_files: usize,
    pub processed_files: usize,
    pub accepted_files: usize,
    pub exported_files: usize,
    pub skipped_files: usize,
    pub duplicate_files: usize,
    pub error_files: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeInfo {
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub copied_bytes: u64,
    pub total_human: String,
    pub processed_human: String,
    pub copied_human: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub count: usize,
    pub size: u64,
    pub size_human: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub files_per_second: f64,
    pub bytes_per_second: u64,
    pub throughput_human: String,
    pub peak_files_per_second: f64,
}

/// Errors of one kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorGroup {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub count: usize,
    pub sample_files: Vec<PathBuf>,
}

/// Run facts the tracker does not know
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub config_file: PathBuf,
    pub worker_count: usize,
}

impl SessionContext {
    /// New session starting now
    pub fn start(source: &Path, destination: &Path, config_file: &Path, worker_count: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            start_time: Utc::now(),
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            config_file: config_file.to_path_buf(),
            worker_count,
        }
    }
}

/// Where the two report files were written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub text: PathBuf,
}

impl RunReport {
    /// Assemble the report from the tracker's final state
    pub fn build(
        session: &SessionContext,
        tracker: &ProgressTracker,
        index: Option<IndexStats>,
        cancelled: bool,
    ) -> Self {
        let end_time = Utc::now();
        let snapshot = tracker.snapshot();
        let elapsed = tracker.elapsed();
        let elapsed_secs = elapsed.as_secs_f64();
        let copied_bytes = tracker.copied_bytes();

        let (files_per_second, bytes_per_second) = if elapsed_secs > 0.0 {
            (
                snapshot.processed_files as f64 / elapsed_secs,
                (snapshot.processed_bytes as f64 / elapsed_secs) as u64,
            )
        } else {
            (0.0, 0)
        };

        let category_breakdown = tracker
            .breakdown()
            .into_iter()
            .map(|(category, stats)| {
                (
                    category,
                    CategoryEntry {
                        count: stats.files,
                        size: stats.bytes,
                        size_human: format_bytes(stats.bytes),
                    },
                )
            })
            .collect();

        let records = tracker.error_records();
        let error_summary = summarize_errors(records.iter().map(|r| (r.kind, r.path.as_path())));

        Self {
            session_info: SessionInfo {
                session_id: session.session_id,
                start_time: session.start_time,
                end_time,
                duration: format_duration(elapsed),
                duration_ms: elapsed.as_millis() as u64,
                source_directory: session.source.clone(),
                destination_directory: session.destination.clone(),
                config_file: session.config_file.clone(),
                worker_count: session.worker_count,
                cancelled,
            },
            file_counts: FileCounts {
                total_files: snapshot.total_files,
                processed_files: snapshot.processed_files,
                accepted_files: snapshot.accepted,
                exported_files: tracker.exports(),
                skipped_files: snapshot.skipped,
                duplicate_files: snapshot.duplicates,
                error_files: snapshot.errors,
                warnings: tracker.warnings(),
            },
            size_info: SizeInfo {
                total_bytes: snapshot.total_bytes,
                processed_bytes: snapshot.processed_bytes,
                copied_bytes,
                total_human: format_bytes(snapshot.total_bytes),
                processed_human: format_bytes(snapshot.processed_bytes),
                copied_human: format_bytes(copied_bytes),
            },
            category_breakdown,
            performance: Performance {
                files_per_second,
                bytes_per_second,
                throughput_human: format!("{}/s", format_bytes(bytes_per_second)),
                peak_files_per_second: tracker.peak_files_per_second(),
            },
            index,
            error_summary,
        }
    }

    /// Write the JSON and text reports into `log_dir`.
    ///
    /// An existing report with the same timestamp is never overwritten.
    pub fn write(&self, log_dir: &Path) -> Result<ReportPaths, ReportError> {
        let stamp = report_timestamp(self.session_info.start_time);

        let json = serde_json::to_vec_pretty(self)?;
        let json_path = write_new(log_dir, &format!("zensort-report_{}.json", stamp), |w| {
            w.write_all(&json)
        })?;

        let text_path = write_new(log_dir, &format!("zensort-report_{}.txt", stamp), |w| {
            write_text(self, w)
        })?;

        Ok(ReportPaths {
            json: json_path,
            text: text_path,
        })
    }
}

/// Group `(kind, path)` pairs by kind, keeping the first three paths.
///
/// Groups are ordered by descending count, then by kind key.
pub fn summarize_errors<'a, I>(errors: I) -> Vec<ErrorGroup>
where
    I: IntoIterator<Item = (ErrorKind, &'a Path)>,
{
    let mut groups: BTreeMap<&'static str, ErrorGroup> = BTreeMap::new();
    for (kind, path) in errors {
        let group = groups.entry(kind.key()).or_insert_with(|| ErrorGroup {
            kind,
            count: 0,
            sample_files: Vec::new(),
        });
        group.count += 1;
        if group.sample_files.len() < MAX_ERROR_SAMPLES {
            group.sample_files.push(path.to_path_buf());
        }
    }

    let mut summary: Vec<ErrorGroup> = groups.into_values().collect();
    summary.sort_by(|a, b| b.count.cmp(&a.count).then(a.kind.key().cmp(b.kind.key())));
    summary
}

/// Human-readable size with 1024-based units
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 1;
    while bytes / div >= UNIT && exp < UNITS.len() - 1 {
        div *= UNIT;
        exp += 1;
    }

    format!("{:.1} {}", bytes as f64 / div as f64, UNITS[exp])
}

/// `12.3s`, `4m 05s` or `1h 02m 03s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Local-time stamp used in log and report file names
pub fn report_timestamp(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d_%H-%M-%S")
        .to_string()
}

fn write_new<F>(dir: &Path, name: &str, fill: F) -> Result<PathBuf, ReportError>
where
    F: FnOnce(&mut std::io::BufWriter<std::fs::File>) -> std::io::Result<()>,
{
    let claimed = claim(dir, Path::new(name)).map_err(|e| ReportError::Write {
        path: dir.join(name),
        source: e,
    })?;
    let path = claimed.absolute;
    let mut writer = std::io::BufWriter::new(claimed.file);
    fill(&mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| ReportError::Write {
            path: path.clone(),
            source: e,
        })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FileEvent;
    use std::fs;
    use tempfile::TempDir;

    fn failed(path: &str, kind: ErrorKind) -> FileEvent {
        FileEvent::Failed {
            path: PathBuf::from(path),
            size: 1,
            kind,
            message: "boom".to_string(),
        }
    }

    fn session(dir: &Path) -> SessionContext {
        SessionContext::start(
            &dir.join("src"),
            &dir.join("dest"),
            &dir.join("dest/zensort-config.json"),
            4,
        )
    }

    #[test]
    fn format_bytes_uses_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024u64.pow(4)), "3.0 TB");
        assert_eq!(format_bytes(u64::MAX), "16384.0 PB");
    }

    #[test]
    fn format_duration_scales() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(245)), "4m 05s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 02m 03s");
    }

    #[test]
    fn error_summary_groups_by_kind_with_three_samples() {
        let paths: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("/src/{}", i))).collect();
        let mut errors: Vec<(ErrorKind, &Path)> =
            paths.iter().map(|p| (ErrorKind::Io, p.as_path())).collect();
        errors.push((ErrorKind::Export, Path::new("/src/x.jpg")));

        let summary = summarize_errors(errors);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].kind, ErrorKind::Io);
        assert_eq!(summary[0].count, 5);
        assert_eq!(summary[0].sample_files.len(), 3);
        assert_eq!(summary[1].kind, ErrorKind::Export);
        assert_eq!(summary[1].count, 1);
    }

    #[test]
    fn report_reflects_tracker() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new();
        tracker.file_discovered(1);
        tracker.file_discovered(1);
        tracker.observe(&failed("/src/a", ErrorKind::Io));
        tracker.observe(&failed("/src/b", ErrorKind::Index));
        tracker.finish();

        let stats = IndexStats {
            records: 7,
            total_bytes: 70,
        };
        let report = RunReport::build(&session(temp_dir.path()), &tracker, Some(stats), false);

        assert_eq!(report.file_counts.total_files, 2);
        assert_eq!(report.file_counts.error_files, 2);
        assert_eq!(report.error_summary.len(), 2);
        assert_eq!(report.index, Some(stats));
        assert_eq!(report.session_info.worker_count, 4);
        assert!(!report.session_info.cancelled);
    }

    #[test]
    fn write_creates_json_and_text() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join(LOG_DIR);
        let tracker = ProgressTracker::new();
        tracker.observe(&failed("/src/broken.jpg", ErrorKind::Metadata));
        tracker.finish();

        let report = RunReport::build(&session(temp_dir.path()), &tracker, None, false);
        let paths = report.write(&log_dir).unwrap();

        let name = paths.json.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("zensort-report_"));
        assert!(name.ends_with(".json"));

        let parsed: RunReport =
            serde_json::from_slice(&fs::read(&paths.json).unwrap()).unwrap();
        assert_eq!(parsed.session_info.session_id, report.session_info.session_id);

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(&paths.json).unwrap()).unwrap();
        assert_eq!(json["error_summary"][0]["type"], "metadata");

        let text = fs::read_to_string(&paths.text).unwrap();
        assert!(text.starts_with("ZenSort Processing Report"));
        assert!(text.contains("/src/broken.jpg"));
    }

    #[test]
    fn second_write_in_same_second_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new();
        tracker.finish();
        let report = RunReport::build(&session(temp_dir.path()), &tracker, None, false);

        let first = report.write(temp_dir.path()).unwrap();
        let second = report.write(temp_dir.path()).unwrap();
        assert_ne!(first.json, second.json);
        assert!(first.json.exists() && second.json.exists());
    }
}
