//! # CLI Module
//!
//! Command-line interface for ZenSort.
//!
//! ## Usage
//! ```bash
//! # Organize a card dump into a library
//! zensort --source /media/card --dest ~/Library
//!
//! # Custom configuration, fixed worker count
//! zensort --source ~/Downloads --dest ~/Library --config my-config.json --workers 4
//!
//! # Originals only, no progress output
//! zensort --source ~/Old --dest ~/Library --no-exports --quiet
//! ```

use clap::Parser;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing_appender::non_blocking::WorkerGuard;
use zensort::core::progress::ProgressTracker;
use zensort::core::reporter::{format_bytes, format_duration, LOG_DIR};
use zensort::core::scanner::Scanner;
use zensort::error::Result;
use zensort::{Organizer, RunResult};

/// ZenSort - Copy a media library into an organized, deduplicated layout
#[derive(Parser, Debug)]
#[command(name = "zensort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to ingest (never modified)
    #[arg(short, long)]
    source: PathBuf,

    /// Library root to organize into
    #[arg(short, long)]
    dest: PathBuf,

    /// Configuration file (defaults to <dest>/zensort-config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of worker threads (default: from memory and CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Do not create downscaled JPEG exports
    #[arg(long)]
    no_exports: bool,

    /// No progress bar or summary
    #[arg(short, long)]
    quiet: bool,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = start_logging(&cli.source, &cli.dest)?;
    let term = Term::stderr();

    if !cli.quiet {
        term.write_line(&format!(
            "{} {}",
            style("ZenSort").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let tracker = Arc::new(ProgressTracker::new());

    let mut builder = Organizer::builder()
        .source(&cli.source)
        .destination(&cli.dest)
        .tracker(Arc::clone(&tracker));
    if let Some(config) = &cli.config {
        builder = builder.config_file(config);
    }
    if let Some(workers) = cli.workers {
        builder = builder.workers(workers);
    }
    if cli.no_exports {
        builder = builder.exports(false);
    }
    let organizer = builder.build();

    let progress_thread = (!cli.quiet).then(|| {
        let subscription = tracker.subscribe();
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );

        thread::spawn(move || {
            while let Some(update) = subscription.recv() {
                pb.set_length(update.total_files as u64);
                pb.set_position(update.processed_files as u64);
                if let Some(current) = &update.current_file {
                    pb.set_message(
                        current
                            .file_name()
                            .unwrap_or_default()
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
                if update.done {
                    break;
                }
            }
            pb.finish_and_clear();
        })
    });

    let result = organizer.run();

    // Dropping every tracker handle ends the subscription if the run failed early
    drop(organizer);
    drop(tracker);
    if let Some(handle) = progress_thread {
        handle.join().ok();
    }

    let result = result?;
    if !cli.quiet {
        print_summary(&term, &result);
    }
    Ok(())
}

/// Open the session log once the source is known to be usable, so a run
/// that cannot start leaves the destination alone
fn start_logging(source: &Path, dest: &Path) -> Result<Option<WorkerGuard>> {
    Scanner::validate_root(source)?;
    Ok(zensort::init_tracing(Some(&dest.join(LOG_DIR))))
}

fn print_summary(term: &Term, result: &RunResult) {
    let summary = &result.summary;
    let report = &result.report;

    let headline = if summary.cancelled {
        format!("{} Run Cancelled", style("!").yellow().bold())
    } else {
        format!("{} Run Complete", style("✓").green().bold())
    };
    term.write_line(&headline).ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} files found in {}",
        style(summary.total_files).cyan(),
        format_duration(std::time::Duration::from_millis(summary.duration_ms))
    ))
    .ok();
    term.write_line(&format!(
        "  {} copied ({})",
        style(summary.accepted).green(),
        format_bytes(summary.copied_bytes)
    ))
    .ok();
    term.write_line(&format!(
        "  {} exports created",
        style(report.file_counts.exported_files).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} duplicates already in the library",
        style(summary.duplicates).yellow()
    ))
    .ok();
    term.write_line(&format!("  {} skipped", style(summary.skipped).dim())).ok();

    if summary.errors > 0 || report.file_counts.warnings > 0 {
        term.write_line(&format!(
            "  {} failed, {} warnings",
            style(summary.errors).red(),
            style(report.file_counts.warnings).yellow()
        ))
        .ok();
    }

    term.write_line("").ok();
    term.write_line(&format!(
        "  {} workers, configuration {}",
        result.worker_count,
        style(result.config_path.display()).dim()
    ))
    .ok();

    if let Some(paths) = &result.report_paths {
        term.write_line(&format!(
            "  Report: {}",
            style(paths.text.display()).dim()
        ))
        .ok();
    }
}
