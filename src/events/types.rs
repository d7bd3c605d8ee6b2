//! Event type definitions for progress reporting.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by an ingest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Source traversal events
    Scan(ScanEvent),
    /// Per-file outcomes
    File(FileEvent),
    /// Run-level events
    Run(RunEvent),
}

/// Events during traversal of the source tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Traversal has started
    Started { source: PathBuf },
    /// An entry could not be read; traversal continues
    Warning { path: PathBuf, message: String },
    /// Traversal finished (or stopped on cancellation)
    Completed { total_files: usize, total_bytes: u64 },
}

/// Why a file was not ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Not a regular file, or stat failed
    NotAFile,
    /// Extension is in `skip_files.extensions`
    Extension,
    /// A parent directory matches `skip_files.directories`
    Directory,
    /// File name matches a `skip_files.patterns` glob
    Pattern,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotAFile => write!(f, "not a regular file"),
            SkipReason::Extension => write!(f, "skipped extension"),
            SkipReason::Directory => write!(f, "skipped directory"),
            SkipReason::Pattern => write!(f, "skipped name pattern"),
        }
    }
}

/// Outcome of processing one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FileEvent {
    /// A worker picked the file up
    Started { path: PathBuf },
    /// The file was copied into the destination
    Accepted {
        source: PathBuf,
        /// Relative to the destination root
        destination: PathBuf,
        size: u64,
        /// Relative path of the JPEG export, if one was written
        export: Option<PathBuf>,
        /// Breakdown label, e.g. `Images/Screenshots`
        category: String,
        digest: String,
    },
    /// Identical content is already in the destination
    Duplicate {
        source: PathBuf,
        existing_destination: PathBuf,
        size: u64,
        digest: String,
    },
    /// The file was filtered out
    Skipped {
        path: PathBuf,
        size: u64,
        reason: SkipReason,
    },
    /// The file could not be ingested
    Failed {
        path: PathBuf,
        size: u64,
        kind: ErrorKind,
        message: String,
    },
    /// Something was downgraded but the file was still handled
    Warning {
        path: PathBuf,
        kind: ErrorKind,
        message: String,
    },
}

/// Run-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// Run has started
    Started {
        source: PathBuf,
        destination: PathBuf,
        workers: usize,
    },
    /// Cancellation was observed; in-flight files are finishing
    Cancelled,
    /// Run finished
    Completed { summary: RunSummary },
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub errors: usize,
    pub copied_bytes: u64,
    pub duration_ms: u64,
    pub cancelled: bool,
}

/// Snapshot published to progress subscribers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Files discovered so far (final once `scan_complete`)
    pub total_files: usize,
    /// Files with a terminal outcome
    pub processed_files: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    /// Most recently started file
    pub current_file: Option<PathBuf>,
    /// Processed fraction of discovered files, 0-100
    pub percentage: f64,
    pub elapsed_ms: u64,
    /// Estimated remaining time, once a rate is known and the scan is done
    pub eta_ms: Option<u64>,
    pub files_per_second: f64,
    pub bytes_per_second: f64,
    pub scan_complete: bool,
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::File(FileEvent::Duplicate {
            source: PathBuf::from("/src/b/photo.jpg"),
            existing_destination: PathBuf::from("Images/Originals/Collections/photo.jpg"),
            size: 2048,
            digest: "ab".repeat(32),
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::File(FileEvent::Duplicate {
                existing_destination,
                ..
            }) => {
                assert!(existing_destination.ends_with("photo.jpg"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn skip_reason_displays_plainly() {
        assert_eq!(SkipReason::Pattern.to_string(), "skipped name pattern");
    }
}
