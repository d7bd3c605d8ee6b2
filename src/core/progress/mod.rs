//! # Progress Module
//!
//! Thread-safe run counters and coalesced progress snapshots.
//!
//! Workers report every per-file outcome through [`ProgressTracker::observe`].
//! Subscribers each get a one-slot channel: a newer snapshot replaces an
//! unread older one, so a slow subscriber only ever sees the latest state,
//! and the final `done` snapshot is always delivered.

use crate::error::ErrorKind;
use crate::events::{FileEvent, ProgressUpdate, RunSummary};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// Default minimum gap between published snapshots
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Files and bytes accepted into one destination category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub files: usize,
    pub bytes: u64,
}

/// One per-file failure or downgrade, kept for the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub path: PathBuf,
    pub message: String,
    /// `false` for warnings where the file was still ingested
    pub fatal: bool,
}

/// Cumulative progress at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub elapsed_ms: u64,
    pub processed_files: usize,
    pub processed_bytes: u64,
}

#[derive(Default)]
struct Counters {
    total_files: AtomicUsize,
    total_bytes: AtomicU64,
    processed_files: AtomicUsize,
    processed_bytes: AtomicU64,
    accepted: AtomicUsize,
    copied_bytes: AtomicU64,
    exports: AtomicUsize,
    duplicates: AtomicUsize,
    skipped: AtomicUsize,
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

struct Subscriber {
    sender: Sender<ProgressUpdate>,
    /// Used to evict an unread snapshot
    stale: Receiver<ProgressUpdate>,
    alive: Weak<()>,
}

/// Receiving end of a progress subscription. Dropping it unsubscribes.
pub struct ProgressSubscription {
    receiver: Receiver<ProgressUpdate>,
    _alive: Arc<()>,
}

impl ProgressSubscription {
    /// Block until the next snapshot; `None` once the tracker is gone
    pub fn recv(&self) -> Option<ProgressUpdate> {
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<ProgressUpdate> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout`. `Err(true)` means the tracker is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ProgressUpdate, bool> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => false,
            RecvTimeoutError::Disconnected => true,
        })
    }
}

/// Shared run counters
pub struct ProgressTracker {
    started: Instant,
    publish_interval: Duration,
    counters: Counters,
    scan_complete: AtomicBool,
    done: AtomicBool,
    current_file: Mutex<Option<PathBuf>>,
    breakdown: Mutex<BTreeMap<String, CategoryStats>>,
    errors: Mutex<Vec<ErrorRecord>>,
    samples: Mutex<Vec<RateSample>>,
    last_publish: Mutex<Option<Instant>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_publish_interval(DEFAULT_PUBLISH_INTERVAL)
    }

    /// Tracker that publishes at most once per `interval` (final snapshot excepted)
    pub fn with_publish_interval(interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            publish_interval: interval,
            counters: Counters::default(),
            scan_complete: AtomicBool::new(false),
            done: AtomicBool::new(false),
            current_file: Mutex::new(None),
            breakdown: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(Vec::new()),
            samples: Mutex::new(Vec::new()),
            last_publish: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> ProgressSubscription {
        let (sender, receiver) = bounded(1);
        let alive = Arc::new(());
        let subscriber = Subscriber {
            sender,
            stale: receiver.clone(),
            alive: Arc::downgrade(&alive),
        };
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(subscriber);
        }
        ProgressSubscription {
            receiver,
            _alive: alive,
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|s| s.iter().filter(|s| s.alive.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// The scanner found a regular file
    pub fn file_discovered(&self, size: u64) {
        self.counters.total_files.fetch_add(1, Ordering::Relaxed);
        self.counters.total_bytes.fetch_add(size, Ordering::Relaxed);
        self.maybe_publish();
    }

    /// The scanner finished; totals are now final
    pub fn scan_completed(&self) {
        self.scan_complete.store(true, Ordering::Relaxed);
        self.maybe_publish();
    }

    /// Fold one per-file event into the counters
    pub fn observe(&self, event: &FileEvent) {
        let c = &self.counters;
        match event {
            FileEvent::Started { path } => {
                if let Ok(mut current) = self.current_file.lock() {
                    *current = Some(path.clone());
                }
            }
            FileEvent::Accepted {
                size,
                category,
                export,
                ..
            } => {
                c.accepted.fetch_add(1, Ordering::Relaxed);
                c.copied_bytes.fetch_add(*size, Ordering::Relaxed);
                self.add_to_category(category, *size);
                if let Some(export) = export {
                    c.exports.fetch_add(1, Ordering::Relaxed);
                    self.add_to_category(&export_category(export), 0);
                }
                self.processed(*size);
            }
            FileEvent::Duplicate { size, .. } => {
                c.duplicates.fetch_add(1, Ordering::Relaxed);
                self.processed(*size);
            }
            FileEvent::Skipped { size, .. } => {
                c.skipped.fetch_add(1, Ordering::Relaxed);
                self.processed(*size);
            }
            FileEvent::Failed {
                path,
                size,
                kind,
                message,
            } => {
                c.errors.fetch_add(1, Ordering::Relaxed);
                self.record_error(*kind, path, message, true);
                self.processed(*size);
            }
            FileEvent::Warning {
                path,
                kind,
                message,
            } => {
                c.warnings.fetch_add(1, Ordering::Relaxed);
                self.record_error(*kind, path, message, false);
            }
        }
        self.maybe_publish();
    }

    /// Mark the run finished and deliver the final snapshot
    pub fn finish(&self) -> ProgressUpdate {
        self.done.store(true, Ordering::Relaxed);
        self.sample(true);
        let update = self.snapshot();
        self.publish(&update);
        update
    }

    /// Current state
    pub fn snapshot(&self) -> ProgressUpdate {
        let c = &self.counters;
        let total_files = c.total_files.load(Ordering::Relaxed);
        let processed_files = c.processed_files.load(Ordering::Relaxed);
        let processed_bytes = c.processed_bytes.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed();
        let elapsed_secs = elapsed.as_secs_f64();
        let scan_complete = self.scan_complete.load(Ordering::Relaxed);
        let done = self.done.load(Ordering::Relaxed);

        let (files_per_second, bytes_per_second) = if elapsed_secs > 0.0 {
            (
                processed_files as f64 / elapsed_secs,
                processed_bytes as f64 / elapsed_secs,
            )
        } else {
            (0.0, 0.0)
        };

        let percentage = if total_files > 0 {
            (processed_files as f64 / total_files as f64 * 100.0).min(100.0)
        } else if done {
            100.0
        } else {
            0.0
        };

        let eta_ms = if done {
            Some(0)
        } else if scan_complete && files_per_second > 0.0 {
            let remaining = total_files.saturating_sub(processed_files) as f64;
            Some((remaining / files_per_second * 1000.0) as u64)
        } else {
            None
        };

        ProgressUpdate {
            total_files,
            processed_files,
            accepted: c.accepted.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            total_bytes: c.total_bytes.load(Ordering::Relaxed),
            processed_bytes,
            current_file: self.current_file.lock().ok().and_then(|c| c.clone()),
            percentage,
            elapsed_ms: elapsed.as_millis() as u64,
            eta_ms,
            files_per_second,
            bytes_per_second,
            scan_complete,
            done,
        }
    }

    /// Totals for the run-completed event
    pub fn summary(&self, cancelled: bool) -> RunSummary {
        let c = &self.counters;
        RunSummary {
            total_files: c.total_files.load(Ordering::Relaxed),
            accepted: c.accepted.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            copied_bytes: c.copied_bytes.load(Ordering::Relaxed),
            duration_ms: self.started.elapsed().as_millis() as u64,
            cancelled,
        }
    }

    pub fn warnings(&self) -> usize {
        self.counters.warnings.load(Ordering::Relaxed)
    }

    pub fn exports(&self) -> usize {
        self.counters.exports.load(Ordering::Relaxed)
    }

    pub fn copied_bytes(&self) -> u64 {
        self.counters.copied_bytes.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Accepted files per destination category
    pub fn breakdown(&self) -> BTreeMap<String, CategoryStats> {
        self.breakdown.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Every recorded failure and warning, in arrival order
    pub fn error_records(&self) -> Vec<ErrorRecord> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Roughly one sample per second of run time
    pub fn samples(&self) -> Vec<RateSample> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Highest files-per-second between consecutive samples
    pub fn peak_files_per_second(&self) -> f64 {
        let samples = self.samples();
        let mut previous = RateSample {
            elapsed_ms: 0,
            processed_files: 0,
            processed_bytes: 0,
        };
        let mut peak = 0.0f64;
        for sample in samples {
            let dt = sample.elapsed_ms.saturating_sub(previous.elapsed_ms) as f64 / 1000.0;
            if dt > 0.0 {
                let rate = sample.processed_files.saturating_sub(previous.processed_files) as f64 / dt;
                peak = peak.max(rate);
            }
            previous = sample;
        }
        peak
    }

    fn processed(&self, size: u64) {
        self.counters.processed_files.fetch_add(1, Ordering::Relaxed);
        self.counters.processed_bytes.fetch_add(size, Ordering::Relaxed);
        self.sample(false);
    }

    fn add_to_category(&self, category: &str, size: u64) {
        if let Ok(mut breakdown) = self.breakdown.lock() {
            let entry = breakdown.entry(category.to_string()).or_default();
            entry.files += 1;
            entry.bytes += size;
        }
    }

    fn record_error(&self, kind: ErrorKind, path: &Path, message: &str, fatal: bool) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(ErrorRecord {
                kind,
                path: path.to_path_buf(),
                message: message.to_string(),
                fatal,
            });
        }
    }

    fn sample(&self, force: bool) {
        let Ok(mut samples) = self.samples.lock() else {
            return;
        };
        let elapsed = self.started.elapsed();
        let due = samples
            .last()
            .map(|last| elapsed.as_millis() as u64 >= last.elapsed_ms + SAMPLE_INTERVAL.as_millis() as u64)
            .unwrap_or(elapsed >= SAMPLE_INTERVAL);
        if due || force {
            samples.push(RateSample {
                elapsed_ms: elapsed.as_millis() as u64,
                processed_files: self.counters.processed_files.load(Ordering::Relaxed),
                processed_bytes: self.counters.processed_bytes.load(Ordering::Relaxed),
            });
        }
    }

    fn maybe_publish(&self) {
        if let Ok(mut last) = self.last_publish.lock() {
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.publish_interval {
                    return;
                }
            }
            *last = Some(now);
        }
        let update = self.snapshot();
        self.publish(&update);
    }

    fn publish(&self, update: &ProgressUpdate) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|subscriber| {
            if subscriber.alive.strong_count() == 0 {
                return false;
            }
            match subscriber.sender.try_send(update.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(update)) => {
                    // Latest wins
                    let _ = subscriber.stale.try_recv();
                    let _ = subscriber.sender.try_send(update);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// `Images/Exports` from `Images/Exports/2021/x.jpg`
fn export_category(export: &Path) -> String {
    export
        .components()
        .take(2)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SkipReason;
    use std::sync::Arc;
    use std::thread;

    fn accepted(name: &str, size: u64, category: &str) -> FileEvent {
        FileEvent::Accepted {
            source: PathBuf::from("/src").join(name),
            destination: PathBuf::from(category).join(name),
            size,
            export: None,
            category: category.to_string(),
            digest: "00".repeat(32),
        }
    }

    #[test]
    fn counters_follow_events() {
        let tracker = ProgressTracker::with_publish_interval(Duration::ZERO);
        for size in [10, 20, 30, 40, 50] {
            tracker.file_discovered(size);
        }
        tracker.scan_completed();

        tracker.observe(&accepted("a.pdf", 10, "Documents/PDF"));
        tracker.observe(&FileEvent::Duplicate {
            source: PathBuf::from("/src/b.pdf"),
            existing_destination: PathBuf::from("Documents/PDF/a.pdf"),
            size: 20,
            digest: "00".repeat(32),
        });
        tracker.observe(&FileEvent::Skipped {
            path: PathBuf::from("/src/c.tmp"),
            size: 30,
            reason: SkipReason::Extension,
        });
        tracker.observe(&FileEvent::Failed {
            path: PathBuf::from("/src/d"),
            size: 40,
            kind: ErrorKind::Io,
            message: "denied".to_string(),
        });
        tracker.observe(&FileEvent::Warning {
            path: PathBuf::from("/src/e.jpg"),
            kind: ErrorKind::Export,
            message: "decode".to_string(),
        });

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_files, 5);
        assert_eq!(snapshot.total_bytes, 150);
        assert_eq!(snapshot.processed_files, 4);
        assert_eq!(snapshot.processed_bytes, 100);
        assert_eq!(snapshot.accepted, 1);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.percentage, 80.0);
        assert!(snapshot.scan_complete);
        assert!(!snapshot.done);

        assert_eq!(tracker.warnings(), 1);
        let errors = tracker.error_records();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].fatal);
        assert!(!errors[1].fatal);

        let summary = tracker.summary(false);
        assert_eq!(summary.copied_bytes, 10);
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn breakdown_groups_categories_and_exports() {
        let tracker = ProgressTracker::new();
        tracker.observe(&accepted("a.mp4", 100, "Videos/Motion Photos"));
        tracker.observe(&accepted("b.mp4", 50, "Videos/Motion Photos"));
        tracker.observe(&FileEvent::Accepted {
            source: PathBuf::from("/src/c.jpg"),
            destination: PathBuf::from("Images/Originals/Collections/c.jpg"),
            size: 7,
            export: Some(PathBuf::from("Images/Exports/Collections/c.jpg")),
            category: "Images".to_string(),
            digest: "11".repeat(32),
        });

        let breakdown = tracker.breakdown();
        assert_eq!(
            breakdown["Videos/Motion Photos"],
            CategoryStats {
                files: 2,
                bytes: 150
            }
        );
        assert_eq!(breakdown["Images"].files, 1);
        assert_eq!(breakdown["Images/Exports"].files, 1);
        assert_eq!(tracker.exports(), 1);
    }

    #[test]
    fn slow_subscriber_gets_latest_and_final_snapshot() {
        let tracker = ProgressTracker::with_publish_interval(Duration::ZERO);
        let subscription = tracker.subscribe();

        for i in 0..50 {
            tracker.file_discovered(i);
        }
        let final_update = tracker.finish();

        let received = subscription.try_recv().unwrap();
        assert!(received.done);
        assert_eq!(received, final_update);
        assert!(subscription.try_recv().is_none());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let tracker = ProgressTracker::with_publish_interval(Duration::ZERO);
        let kept = tracker.subscribe();
        let dropped = tracker.subscribe();
        assert_eq!(tracker.subscriber_count(), 2);

        drop(dropped);
        tracker.file_discovered(1);
        assert_eq!(tracker.subscriber_count(), 1);
        assert!(kept.try_recv().is_some());
    }

    #[test]
    fn throttle_limits_intermediate_snapshots() {
        let tracker = ProgressTracker::with_publish_interval(Duration::from_secs(3600));
        let subscription = tracker.subscribe();

        tracker.file_discovered(1);
        let first = subscription.try_recv().unwrap();
        assert_eq!(first.total_files, 1);

        tracker.file_discovered(1);
        assert!(subscription.try_recv().is_none());

        tracker.finish();
        assert_eq!(subscription.try_recv().unwrap().total_files, 2);
    }

    #[test]
    fn concurrent_observers_do_not_lose_counts() {
        let tracker = Arc::new(ProgressTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for i in 0..100 {
                        tracker.observe(&accepted(&format!("{}-{}.bin", t, i), 1, "Unknown"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.snapshot().accepted, 800);
        assert_eq!(tracker.breakdown()["Unknown"].files, 800);
    }

    #[test]
    fn finish_records_a_sample_and_full_percentage() {
        let tracker = ProgressTracker::new();
        let update = tracker.finish();

        assert!(update.done);
        assert_eq!(update.percentage, 100.0);
        assert_eq!(update.eta_ms, Some(0));
        assert_eq!(tracker.samples().len(), 1);
    }

    #[test]
    fn export_category_takes_two_components() {
        assert_eq!(
            export_category(Path::new("Images/Exports/2021/a.jpg")),
            "Images/Exports"
        );
    }
}
