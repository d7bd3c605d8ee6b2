//! SQLite index backend for persistent storage.

use super::{ContentIndex, FileRecord, IndexStats, NewRecord};
use crate::core::hasher::ContentDigest;
use crate::error::IndexError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Directory under the destination root owned by the index
pub const INDEX_DIR: &str = "zensort-db";
/// Database file name inside [`INDEX_DIR`]
pub const INDEX_FILE: &str = "index.sqlite";

/// SQLite-backed content index
///
/// Uses WAL mode; every insert is its own committed transaction.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteIndex {
    /// Open or create the index for a destination root
    pub fn open_in(destination: &Path) -> Result<Self, IndexError> {
        Self::open(&destination.join(INDEX_DIR).join(INDEX_FILE))
    }

    /// Open or create an index database at the given path
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let open_err = |reason: String| IndexError::OpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| open_err(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| open_err(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| open_err(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                digest TEXT NOT NULL UNIQUE,
                original_path TEXT NOT NULL,
                destination_path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| open_err(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::Corrupted {
            path: self.db_path.clone(),
        })
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String, i64, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn decode(
        &self,
        raw: (i64, String, String, String, i64, String),
    ) -> Result<FileRecord, IndexError> {
        let (id, digest, original, destination, size, ingested_at) = raw;
        let corrupted = || IndexError::Corrupted {
            path: self.db_path.clone(),
        };
        let digest: ContentDigest = digest.parse().map_err(|_| corrupted())?;
        let ingested_at = DateTime::parse_from_rfc3339(&ingested_at)
            .map_err(|_| corrupted())?
            .with_timezone(&Utc);
        Ok(FileRecord {
            monotonic_id: id,
            digest,
            original_path: PathBuf::from(original),
            destination_path: PathBuf::from(destination),
            size_bytes: size as u64,
            ingested_at,
        })
    }
}

impl ContentIndex for SqliteIndex {
    fn lookup(&self, digest: &ContentDigest) -> Result<Option<PathBuf>, IndexError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT destination_path FROM files WHERE digest = ?",
            [digest.to_hex()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map(|found| found.map(PathBuf::from))
        .map_err(|e| IndexError::QueryFailed(e.to_string()))
    }

    fn insert(&self, record: NewRecord) -> Result<FileRecord, IndexError> {
        let conn = self.lock()?;
        let digest = record.digest.to_hex();

        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO files
                 (digest, original_path, destination_path, size_bytes, ingested_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    digest,
                    record.original_path.to_string_lossy(),
                    record.destination_path.to_string_lossy(),
                    record.size_bytes as i64,
                    record.ingested_at.to_rfc3339(),
                ],
            )
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        if changed == 0 {
            let existing: String = conn
                .query_row(
                    "SELECT destination_path FROM files WHERE digest = ?",
                    [&digest],
                    |row| row.get(0),
                )
                .map_err(|e| IndexError::QueryFailed(e.to_string()))?;
            return Err(IndexError::Duplicate {
                digest,
                existing: PathBuf::from(existing),
            });
        }

        Ok(FileRecord::from_new(conn.last_insert_rowid(), record))
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM files",
            [],
            |row| {
                Ok(IndexStats {
                    records: row.get::<_, i64>(0)? as u64,
                    total_bytes: row.get::<_, i64>(1)? as u64,
                })
            },
        )
        .map_err(|e| IndexError::QueryFailed(e.to_string()))
    }

    fn records(&self) -> Result<Vec<FileRecord>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, digest, original_path, destination_path, size_bytes, ingested_at
                 FROM files ORDER BY id",
            )
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_record)
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IndexError::QueryFailed(e.to_string()))?;

        rows.into_iter().map(|raw| self.decode(raw)).collect()
    }

    fn close(&self) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| IndexError::QueryFailed(e.to_string()))
    }
}
