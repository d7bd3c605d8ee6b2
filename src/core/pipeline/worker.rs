//! Per-file processing.
//!
//! Order for one file: stat, skip rules, digest, index lookup, classify,
//! metadata, route, claim, copy, export, index insert. Hash always
//! precedes lookup, lookup precedes copy, and copy precedes insert.
//!
//! A failure on one file never escapes [`FileWorker::process`]; it becomes
//! a `Failed` or `Warning` event instead.

use super::executor::CancellationToken;
use crate::config::Configuration;
use crate::core::classifier::{Classifier, MediaClass};
use crate::core::exporter::{ExportSettings, Exporter};
use crate::core::hasher::{digest_with_chunk, ContentDigest};
use crate::core::index::{ContentIndex, NewRecord};
use crate::core::metadata::{extract_image, ImageMetadata, VideoProbe};
use crate::core::progress::ProgressTracker;
use crate::core::router::{claim, route, ClaimedFile, RouteRequest};
use crate::core::scanner::{SkipRules, WorkItem};
use crate::error::{ErrorKind, IndexError};
use crate::events::{Event, EventSender, FileEvent, SkipReason};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Per-digest critical sections.
///
/// A worker holds its digest from index lookup to index insert, so
/// identical content is copied at most once. Workers with different
/// digests never wait on each other.
#[derive(Default)]
pub struct DigestLocks {
    in_flight: Mutex<HashSet<ContentDigest>>,
    released: Condvar,
}

impl DigestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other worker holds `digest`, then take it
    pub fn lock(&self, digest: &ContentDigest) -> DigestGuard<'_> {
        let mut held = self.held();
        while held.contains(digest) {
            // The guarded set stays consistent across a panic
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(*digest);
        DigestGuard {
            locks: self,
            digest: *digest,
        }
    }

    fn held(&self) -> MutexGuard<'_, HashSet<ContentDigest>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its digest on drop
pub struct DigestGuard<'a> {
    locks: &'a DigestLocks,
    digest: ContentDigest,
}

impl Drop for DigestGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.digest);
        self.locks.released.notify_all();
    }
}

/// Collaborators shared by every worker in a run
pub struct WorkerContext<'a> {
    pub config: &'a Configuration,
    pub rules: &'a SkipRules,
    pub index: &'a dyn ContentIndex,
    pub probe: &'a dyn VideoProbe,
    pub tracker: &'a ProgressTracker,
    pub events: &'a EventSender,
    pub cancel: &'a CancellationToken,
    pub locks: &'a DigestLocks,
    /// Destination root
    pub destination: &'a Path,
}

impl WorkerContext<'_> {
    /// Count the event, then forward it
    fn emit(&self, event: FileEvent) {
        self.tracker.observe(&event);
        self.events.send(Event::File(event));
    }

    fn warn(&self, path: &Path, kind: ErrorKind, message: String) {
        warn!(path = %path.display(), %kind, %message, "Downgraded");
        self.emit(FileEvent::Warning {
            path: path.to_path_buf(),
            kind,
            message,
        });
    }

    fn fail(&self, item: &WorkItem, kind: ErrorKind, message: String) -> Outcome {
        error!(path = %item.path.display(), %kind, %message, "File failed");
        self.emit(FileEvent::Failed {
            path: item.path.clone(),
            size: item.size,
            kind,
            message,
        });
        Outcome::Failed(kind)
    }

    fn skip(&self, item: &WorkItem, size: u64, reason: SkipReason) -> Outcome {
        debug!(path = %item.path.display(), %reason, "Skipped");
        self.emit(FileEvent::Skipped {
            path: item.path.clone(),
            size,
            reason,
        });
        Outcome::Skipped(reason)
    }
}

/// Terminal state of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted {
        destination: PathBuf,
        export: Option<PathBuf>,
    },
    Duplicate {
        existing: PathBuf,
    },
    Skipped(SkipReason),
    Failed(ErrorKind),
    /// Cancellation was observed before the file was finished
    Cancelled,
}

/// Processes files one at a time. Keep one per thread.
pub struct FileWorker<'a> {
    ctx: &'a WorkerContext<'a>,
    exporter: Exporter,
    buffer: Vec<u8>,
}

impl<'a> FileWorker<'a> {
    pub fn new(ctx: &'a WorkerContext<'a>) -> Self {
        let processing = &ctx.config.processing;
        Self {
            ctx,
            exporter: Exporter::new(ExportSettings::from(processing)),
            buffer: vec![0; processing.buffer_size.max(1)],
        }
    }

    /// Ingest one file end to end
    pub fn process(&mut self, item: &WorkItem) -> Outcome {
        let ctx = self.ctx;
        if ctx.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        ctx.emit(FileEvent::Started {
            path: item.path.clone(),
        });

        let metadata = match fs::metadata(&item.path) {
            Ok(m) if m.is_file() => m,
            _ => return ctx.skip(item, item.size, SkipReason::NotAFile),
        };
        let size = metadata.len();

        if let Some(reason) = ctx.rules.check(&item.relative) {
            return ctx.skip(item, size, reason);
        }

        let digest = match digest_with_chunk(&item.path, ctx.config.processing.hash_chunk_size) {
            Ok(digest) => digest,
            Err(e) => return ctx.fail(item, ErrorKind::Io, format!("hash failed: {}", e)),
        };

        let _guard = ctx.locks.lock(&digest);

        match ctx.index.lookup(&digest) {
            Ok(Some(existing)) => return self.duplicate(item, size, digest, existing),
            Ok(None) => {}
            Err(e) => return ctx.fail(item, ErrorKind::Index, e.to_string()),
        }

        let classified = Classifier::new(ctx.config, ctx.probe).classify(&item.path);
        if let Some(message) = classified.sniff_error {
            ctx.warn(&item.path, ErrorKind::Classification, message);
        }
        let classification = classified.classification;
        let flags = classification.flags;

        let image = if classification.class == MediaClass::Image && !flags.hidden && !flags.screenshot
        {
            match extract_image(&item.path) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    ctx.warn(&item.path, ErrorKind::Metadata, e.to_string());
                    Some(ImageMetadata::default())
                }
            }
        } else {
            None
        };

        let Some(file_name) = item.path.file_name() else {
            return ctx.fail(item, ErrorKind::Routing, "path has no file name".to_string());
        };
        let route = route(
            ctx.config,
            &RouteRequest {
                classification,
                file_name,
                image: image.as_ref(),
                modified: metadata.modified().ok(),
            },
        );
        debug!(
            path = %item.path.display(),
            destination = %route.primary.display(),
            category = %route.category,
            "Routed"
        );

        let claimed = match claim(ctx.destination, &route.primary) {
            Ok(claimed) => claimed,
            Err(e) => {
                return ctx.fail(
                    item,
                    ErrorKind::Io,
                    format!("cannot create {}: {}", route.primary.display(), e),
                )
            }
        };
        let destination = claimed.relative.clone();
        let absolute = claimed.absolute.clone();

        match self.copy_into(&item.path, claimed, &metadata) {
            Ok(true) => {}
            Ok(false) => {
                let _ = fs::remove_file(&absolute);
                debug!(path = %item.path.display(), "Copy abandoned on cancellation");
                return Outcome::Cancelled;
            }
            Err(e) => {
                let _ = fs::remove_file(&absolute);
                return ctx.fail(item, ErrorKind::Io, format!("copy failed: {}", e));
            }
        }

        let export = match (&route.export, &image) {
            (Some(export_path), Some(meta)) => match self.exporter.export(
                &item.path,
                meta.orientation,
                ctx.destination,
                export_path,
            ) {
                Ok(written) => Some(written),
                Err(e) => {
                    ctx.warn(&item.path, ErrorKind::Export, e.to_string());
                    None
                }
            },
            _ => None,
        };

        let record = NewRecord::new(digest, item.path.clone(), destination.clone(), size);
        match ctx.index.insert(record) {
            Ok(_) => {}
            Err(IndexError::Duplicate { existing, .. }) => {
                let _ = fs::remove_file(&absolute);
                if let Some(export) = &export {
                    let _ = fs::remove_file(ctx.destination.join(export));
                }
                return self.duplicate(item, size, digest, existing);
            }
            Err(e) => {
                // The copy stays; a later run will see it as new content
                ctx.warn(&item.path, ErrorKind::Index, e.to_string());
            }
        }

        info!(
            source = %item.path.display(),
            destination = %destination.display(),
            size,
            "Accepted"
        );
        ctx.emit(FileEvent::Accepted {
            source: item.path.clone(),
            destination: destination.clone(),
            size,
            export: export.clone(),
            category: route.category,
            digest: digest.to_hex(),
        });

        Outcome::Accepted {
            destination,
            export,
        }
    }

    fn duplicate(
        &self,
        item: &WorkItem,
        size: u64,
        digest: ContentDigest,
        existing: PathBuf,
    ) -> Outcome {
        debug!(
            path = %item.path.display(),
            existing = %existing.display(),
            "Duplicate content"
        );
        self.ctx.emit(FileEvent::Duplicate {
            source: item.path.clone(),
            existing_destination: existing.clone(),
            size,
            digest: digest.to_hex(),
        });
        Outcome::Duplicate { existing }
    }

    /// Stream `source` into the claimed file, then copy permission bits.
    ///
    /// Returns `Ok(false)` if cancellation interrupted the copy.
    fn copy_into(
        &mut self,
        source: &Path,
        claimed: ClaimedFile,
        metadata: &fs::Metadata,
    ) -> io::Result<bool> {
        let mut reader = File::open(source)?;
        let mut writer = claimed.file;

        loop {
            if self.ctx.cancel.is_cancelled() {
                return Ok(false);
            }
            let n = match reader.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            writer.write_all(&self.buffer[..n])?;
        }

        writer.sync_data()?;
        drop(writer);
        fs::set_permissions(&claimed.absolute, metadata.permissions())?;
        Ok(true)
    }
}
