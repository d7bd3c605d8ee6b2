//! # Index Module
//!
//! Durable content-addressed record of every accepted file.
//!
//! ## Guarantees
//! - At most one [`FileRecord`] per digest
//! - `insert` of a known digest is a no-op that reports `Duplicate`
//! - `lookup` and `insert` are linearizable
//!
//! ## Backends
//! - `SqliteIndex` - persistent, stored under `zensort-db/`
//! - `InMemoryIndex` - for testing

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryIndex;
pub use sqlite::{SqliteIndex, INDEX_DIR, INDEX_FILE};
pub use traits::ContentIndex;

use crate::core::hasher::ContentDigest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A record about to be inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub digest: ContentDigest,
    /// Absolute source path
    pub original_path: PathBuf,
    /// Relative to the destination root
    pub destination_path: PathBuf,
    pub size_bytes: u64,
    pub ingested_at: DateTime<Utc>,
}

impl NewRecord {
    pub fn new(
        digest: ContentDigest,
        original_path: PathBuf,
        destination_path: PathBuf,
        size_bytes: u64,
    ) -> Self {
        Self {
            digest,
            original_path,
            destination_path,
            size_bytes,
            ingested_at: Utc::now(),
        }
    }
}

/// A stored record. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Strictly increasing insertion order
    pub monotonic_id: i64,
    pub digest: ContentDigest,
    pub original_path: PathBuf,
    pub destination_path: PathBuf,
    pub size_bytes: u64,
    pub ingested_at: DateTime<Utc>,
}

impl FileRecord {
    fn from_new(monotonic_id: i64, record: NewRecord) -> Self {
        Self {
            monotonic_id,
            digest: record.digest,
            original_path: record.original_path,
            destination_path: record.destination_path,
            size_bytes: record.size_bytes,
            ingested_at: record.ingested_at,
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of records
    pub records: u64,
    /// Sum of recorded file sizes
    pub total_bytes: u64,
}
