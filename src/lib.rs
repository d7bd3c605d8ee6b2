//! # ZenSort
//!
//! Copies a media library into a canonical, deduplicated folder layout.
//!
//! ## Core Philosophy
//! - **Never touch the source** - files are copied, never moved or modified
//! - **Store content once** - a SHA-256 index keeps duplicates out, across runs
//! - **Explain every file** - each one ends as accepted, duplicate, skipped or failed
//!
//! ## Architecture
//! - `core` - scanning, hashing, classification, routing, export, index
//! - `config` - the `zensort-config.json` record
//! - `events` - per-file and run events
//! - `error` - error types
//! - `cli` - command-line interface (binary only)

pub mod config;
pub mod core;
pub mod error;
pub mod events;

pub use config::Configuration;
pub use core::pipeline::{CancellationToken, Organizer, OrganizerBuilder, RunResult};
pub use error::{Result, ZenSortError};

use chrono::Local;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialize tracing for the application.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. With a
/// `log_dir`, everything the filter allows goes to
/// `zensort_YYYY-MM-DD_HH-MM-SS.log` there and stderr only shows warnings;
/// without one, stderr gets it all. Keep the returned guard alive until
/// exit so buffered lines are flushed.
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = log_dir.and_then(|dir| {
        let prefix = format!("zensort_{}", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .build(dir)
            .map_err(|e| eprintln!("Log file unavailable in {}: {}", dir.display(), e))
            .ok()
    });

    let (file_layer, guard, stderr_level) = match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
                LevelFilter::WARN,
            )
        }
        None => (None, None, LevelFilter::TRACE),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stderr_level);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}
