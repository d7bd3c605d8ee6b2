//! In-memory index backend for testing.

use super::{ContentIndex, FileRecord, IndexStats, NewRecord};
use crate::core::hasher::ContentDigest;
use crate::error::IndexError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    records: HashMap<ContentDigest, FileRecord>,
    next_id: i64,
}

/// In-memory content index
///
/// Useful for testing and scenarios where persistence isn't needed.
#[derive(Default)]
pub struct InMemoryIndex {
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> IndexError {
        IndexError::Corrupted {
            path: PathBuf::from("memory"),
        }
    }
}

impl ContentIndex for InMemoryIndex {
    fn lookup(&self, digest: &ContentDigest) -> Result<Option<PathBuf>, IndexError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .records
            .get(digest)
            .map(|r| r.destination_path.clone()))
    }

    fn insert(&self, record: NewRecord) -> Result<FileRecord, IndexError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;

        if let Some(existing) = inner.records.get(&record.digest) {
            return Err(IndexError::Duplicate {
                digest: record.digest.to_hex(),
                existing: existing.destination_path.clone(),
            });
        }

        inner.next_id += 1;
        let stored = FileRecord::from_new(inner.next_id, record);
        inner.records.insert(stored.digest, stored.clone());
        Ok(stored)
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(IndexStats {
            records: inner.records.len() as u64,
            total_bytes: inner.records.values().map(|r| r.size_bytes).sum(),
        })
    }

    fn records(&self) -> Result<Vec<FileRecord>, IndexError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut records: Vec<_> = inner.records.values().cloned().collect();
        records.sort_by_key(|r| r.monotonic_id);
        Ok(records)
    }

    fn close(&self) -> Result<(), IndexError> {
        Ok(())
    }
}
