//! # Error Module
//!
//! Error types for the ZenSort ingest pipeline.
//!
//! ## Design Principles
//! - **Contain per-file failures** - one bad file never aborts a run
//! - **Include context** - paths and the underlying cause
//! - **Run-level errors are few** - config, source, destination, index open

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum ZenSortError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Destination {path} is not writable: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while walking the source tree
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Source is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Failed to read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Scan was cancelled")]
    Cancelled,
}

/// Errors raised while loading or validating the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write config file {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Errors from the content index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to open index at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Index query failed: {0}")]
    QueryFailed(String),

    #[error("Index corruption detected at {path}. Delete this directory and try again.")]
    Corrupted { path: PathBuf },

    #[error("Digest {digest} is already indexed at {existing}")]
    Duplicate { digest: String, existing: PathBuf },
}

/// Errors while reading embedded metadata. Always downgraded to
/// "no metadata" by the caller.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata extraction timed out after {seconds}s for {path}")]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("Metadata worker for {path} exited without a result")]
    WorkerLost { path: PathBuf },
}

/// Errors from the image export pass. Never fatal for the original copy.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to resize image {path}: {reason}")]
    Resize { path: PathBuf, reason: String },

    #[error("Failed to encode export for {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Failed to write export {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while writing end-of-run reports
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure categories used to tag per-file events and group the report's
/// error summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Io,
    Metadata,
    Index,
    Classification,
    Export,
    Routing,
}

impl ErrorKind {
    /// Short stable key used in reports
    pub fn key(&self) -> &'static str {
        match self {
            ErrorKind::Io => "io",
            ErrorKind::Metadata => "metadata",
            ErrorKind::Index => "index",
            ErrorKind::Classification => "classification",
            ErrorKind::Export => "export",
            ErrorKind::Routing => "routing",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, ZenSortError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_error_includes_path() {
        let error = ScanError::DirectoryNotFound {
            path: PathBuf::from("/photos/vacation"),
        };
        assert!(error.to_string().contains("/photos/vacation"));
    }

    #[test]
    fn index_error_suggests_recovery() {
        let error = IndexError::Corrupted {
            path: PathBuf::from("/dest/zensort-db"),
        };
        assert!(error.to_string().contains("Delete this directory"));
    }

    #[test]
    fn config_error_names_field() {
        let error = ConfigError::Invalid {
            field: "processing.jpeg_quality".to_string(),
            reason: "must be between 1 and 100".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("processing.jpeg_quality"));
        assert!(message.contains("between 1 and 100"));
    }

    #[test]
    fn error_kind_keys_are_stable() {
        assert_eq!(ErrorKind::Io.key(), "io");
        assert_eq!(ErrorKind::Export.to_string(), "export");
    }
}
