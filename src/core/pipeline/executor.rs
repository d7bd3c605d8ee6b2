//! Run orchestration.

use super::worker::{FileWorker, DigestLocks, WorkerContext};
use crate::config::{Configuration, CONFIG_FILE_NAME};
use crate::core::index::{ContentIndex, SqliteIndex};
use crate::core::metadata::{FfprobeProbe, VideoProbe};
use crate::core::progress::ProgressTracker;
use crate::core::reporter::{ReportPaths, RunReport, SessionContext, LOG_DIR};
use crate::core::scanner::{ScanSummary, Scanner, SkipRules, WorkItem};
use crate::error::{ScanError, ZenSortError};
use crate::events::{null_sender, Event, EventSender, RunEvent, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use sysinfo::System;
use tracing::{debug, info, warn};

/// Upper bound for the automatic worker count
pub const MAX_WORKERS: usize = 16;

const GIB: u64 = 1024 * 1024 * 1024;

/// Cooperative cancellation flag shared between the caller and a run.
///
/// Once cancelled, no new files are dispatched and in-flight copies stop
/// at the next buffer boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Worker count from available memory and CPU count.
///
/// One worker per free GiB, at most two per logical CPU, clamped to
/// `1..=MAX_WORKERS`.
pub fn default_worker_count() -> usize {
    let mut system = System::new();
    system.refresh_memory();
    let memory_gib = (system.available_memory() / GIB) as usize;

    let cpus = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    worker_count_for(memory_gib, cpus)
}

fn worker_count_for(memory_gib: usize, cpus: usize) -> usize {
    memory_gib.max(1).min(cpus * 2).clamp(1, MAX_WORKERS)
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunResult {
    pub summary: RunSummary,
    pub report: RunReport,
    /// Where the reports were written, if they were
    pub report_paths: Option<ReportPaths>,
    /// Configuration file that was used (or written)
    pub config_path: PathBuf,
    pub worker_count: usize,
}

/// Builder for an [`Organizer`]
pub struct OrganizerBuilder {
    source: PathBuf,
    destination: PathBuf,
    config: Option<Configuration>,
    config_file: Option<PathBuf>,
    workers: Option<usize>,
    exports: Option<bool>,
    probe: Option<Box<dyn VideoProbe>>,
    index: Option<Box<dyn ContentIndex>>,
    tracker: Option<Arc<ProgressTracker>>,
    cancel: CancellationToken,
    write_reports: bool,
}

impl OrganizerBuilder {
    pub fn new() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            config: None,
            config_file: None,
            workers: None,
            exports: None,
            probe: None,
            index: None,
            tracker: None,
            cancel: CancellationToken::new(),
            write_reports: true,
        }
    }

    /// Tree to ingest
    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    /// Library root to organize into
    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Use this configuration instead of loading one
    pub fn config(mut self, config: Configuration) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from this file
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Fixed worker count (at least 1)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    /// Override `processing.enable_image_exports`
    pub fn exports(mut self, enabled: bool) -> Self {
        self.exports = Some(enabled);
        self
    }

    /// Video duration probe (defaults to `ffprobe`)
    pub fn probe(mut self, probe: Box<dyn VideoProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Index backend (defaults to SQLite under the destination)
    pub fn index(mut self, index: Box<dyn ContentIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Share a tracker so callers can subscribe before the run starts
    pub fn tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Write JSON and text reports to `zensort-logs/` (default on)
    pub fn reports(mut self, enabled: bool) -> Self {
        self.write_reports = enabled;
        self
    }

    pub fn build(self) -> Organizer {
        Organizer {
            source: self.source,
            destination: self.destination,
            config: self.config,
            config_file: self.config_file,
            workers: self.workers,
            exports: self.exports,
            probe: self
                .probe
                .unwrap_or_else(|| Box::new(FfprobeProbe::new())),
            index: self.index,
            tracker: self
                .tracker
                .unwrap_or_else(|| Arc::new(ProgressTracker::new())),
            cancel: self.cancel,
            write_reports: self.write_reports,
        }
    }
}

impl Default for OrganizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies a source tree into an organized, deduplicated destination.
///
/// Each `Organizer` is meant for one run; the tracker keeps counting
/// across repeated runs.
pub struct Organizer {
    source: PathBuf,
    destination: PathBuf,
    config: Option<Configuration>,
    config_file: Option<PathBuf>,
    workers: Option<usize>,
    exports: Option<bool>,
    probe: Box<dyn VideoProbe>,
    index: Option<Box<dyn ContentIndex>>,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
    write_reports: bool,
}

impl Organizer {
    pub fn builder() -> OrganizerBuilder {
        OrganizerBuilder::new()
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run without an event listener
    pub fn run(&self) -> Result<RunResult, ZenSortError> {
        self.run_with_events(&null_sender())
    }

    /// Run, reporting every event to `events`
    pub fn run_with_events(&self, events: &EventSender) -> Result<RunResult, ZenSortError> {
        Scanner::validate_root(&self.source)?;

        fs::create_dir_all(&self.destination).map_err(|e| ZenSortError::Destination {
            path: self.destination.clone(),
            source: e,
        })?;

        let (mut config, config_path) = self.resolve_config()?;
        if let Some(enabled) = self.exports {
            config.processing.enable_image_exports = enabled;
        }

        let rules = SkipRules::new(&config.skip_files)?;

        let opened;
        let index: &dyn ContentIndex = match &self.index {
            Some(index) => index.as_ref(),
            None => {
                opened = SqliteIndex::open_in(&self.destination)?;
                &opened
            }
        };

        let workers = self.workers.unwrap_or_else(default_worker_count);
        let session = SessionContext::start(&self.source, &self.destination, &config_path, workers);
        let tracker = self.tracker.as_ref();

        info!(
            source = %self.source.display(),
            destination = %self.destination.display(),
            config = %config_path.display(),
            workers,
            "Run started"
        );
        events.send(Event::Run(RunEvent::Started {
            source: self.source.clone(),
            destination: self.destination.clone(),
            workers,
        }));

        let mut scanner = Scanner::new(&rules);
        if let Some(nested) = nested_destination(&self.source, &self.destination) {
            debug!(path = %nested.display(), "Destination is inside the source, excluding it");
            scanner = scanner.exclude(nested);
        }

        let locks = DigestLocks::new();
        let ctx = WorkerContext {
            config: &config,
            rules: &rules,
            index,
            probe: self.probe.as_ref(),
            tracker,
            events,
            cancel: &self.cancel,
            locks: &locks,
            destination: &self.destination,
        };

        let (scan, announced) = self.dispatch(&scanner, &ctx, workers, events);
        let scan = scan?;
        debug!(
            files = scan.total_files,
            bytes = scan.total_bytes,
            warnings = scan.warnings,
            "Scan finished"
        );

        let cancelled = self.cancel.is_cancelled();
        if cancelled && !announced {
            events.send(Event::Run(RunEvent::Cancelled));
        }

        tracker.finish();

        let index_stats = match index.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Could not read index totals");
                None
            }
        };
        if let Err(e) = index.close() {
            warn!(error = %e, "Index close failed");
        }

        let report = RunReport::build(&session, tracker, index_stats, cancelled);
        let report_paths = if self.write_reports {
            match report.write(&self.destination.join(LOG_DIR)) {
                Ok(paths) => {
                    info!(json = %paths.json.display(), text = %paths.text.display(), "Reports written");
                    Some(paths)
                }
                Err(e) => {
                    warn!(error = %e, "Report could not be written");
                    None
                }
            }
        } else {
            None
        };

        let summary = tracker.summary(cancelled);
        info!(
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            errors = summary.errors,
            cancelled,
            "Run completed"
        );
        events.send(Event::Run(RunEvent::Completed {
            summary: summary.clone(),
        }));

        Ok(RunResult {
            summary,
            report,
            report_paths,
            config_path,
            worker_count: workers,
        })
    }

    fn resolve_config(&self) -> Result<(Configuration, PathBuf), ZenSortError> {
        match &self.config {
            Some(config) => {
                config.validate()?;
                let path = self
                    .config_file
                    .clone()
                    .unwrap_or_else(|| self.destination.join(CONFIG_FILE_NAME));
                Ok((config.clone(), path))
            }
            None => Ok(Configuration::load_or_init(
                &self.destination,
                self.config_file.as_deref(),
            )?),
        }
    }

    /// Scan on this thread and process on `workers` scoped threads.
    ///
    /// Returns the scan result and whether `RunEvent::Cancelled` was sent.
    fn dispatch(
        &self,
        scanner: &Scanner<'_>,
        ctx: &WorkerContext<'_>,
        workers: usize,
        events: &EventSender,
    ) -> (Result<ScanSummary, ScanError>, bool) {
        let (tx, rx) = crossbeam_channel::bounded::<WorkItem>(workers * 2);
        let tracker = ctx.tracker;

        thread::scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                scope.spawn(move || {
                    let mut worker = FileWorker::new(ctx);
                    for item in rx.iter() {
                        // Drain without processing once cancelled
                        if ctx.cancel.is_cancelled() {
                            continue;
                        }
                        worker.process(&item);
                    }
                });
            }
            drop(rx);

            let scan = scanner.scan(&self.source, &self.cancel, events, |item| {
                tracker.file_discovered(item.size);
                tx.send(item).is_ok()
            });
            drop(tx);
            tracker.scan_completed();

            let announced = self.cancel.is_cancelled();
            if announced {
                info!("Cancellation observed, finishing in-flight files");
                events.send(Event::Run(RunEvent::Cancelled));
            }
            (scan, announced)
        })
    }
}

/// `destination` as a path below `source`, if it lies inside it
fn nested_destination(source: &Path, destination: &Path) -> Option<PathBuf> {
    let source_abs = fs::canonicalize(source).ok()?;
    let dest_abs = fs::canonicalize(destination).ok()?;
    let below = dest_abs.strip_prefix(&source_abs).ok()?;
    if below.as_os_str().is_empty() {
        return None;
    }
    Some(source.join(below))
}
