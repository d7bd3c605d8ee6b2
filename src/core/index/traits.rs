//! Index backend trait definition.

use super::{FileRecord, IndexStats, NewRecord};
use crate::core::hasher::ContentDigest;
use crate::error::IndexError;
use std::path::PathBuf;

/// Trait for content index backends
pub trait ContentIndex: Send + Sync {
    /// Destination of the record for `digest`, if any
    fn lookup(&self, digest: &ContentDigest) -> Result<Option<PathBuf>, IndexError>;

    /// Store a record.
    ///
    /// Fails with [`IndexError::Duplicate`] carrying the existing
    /// destination when the digest is already present; nothing is written
    /// in that case.
    fn insert(&self, record: NewRecord) -> Result<FileRecord, IndexError>;

    /// Record count and byte total
    fn stats(&self) -> Result<IndexStats, IndexError>;

    /// All records in insertion order
    fn records(&self) -> Result<Vec<FileRecord>, IndexError>;

    /// Flush everything durably
    fn close(&self) -> Result<(), IndexError>;
}
