//! Plain-text rendering of a run report.

use super::{format_bytes, RunReport};
use chrono::Local;
use std::io::Write;

/// Write the human-readable report
pub fn write_text<W: Write>(report: &RunReport, mut writer: W) -> std::io::Result<()> {
    let session = &report.session_info;
    let counts = &report.file_counts;
    let sizes = &report.size_info;
    let perf = &report.performance;

    writeln!(writer, "ZenSort Processing Report")?;
    writeln!(writer, "========================")?;
    writeln!(writer)?;

    writeln!(writer, "Session Information:")?;
    writeln!(writer, "  Session ID: {}", session.session_id)?;
    writeln!(
        writer,
        "  Start Time: {}",
        session.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(
        writer,
        "  End Time: {}",
        session.end_time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(writer, "  Duration: {}", session.duration)?;
    writeln!(writer, "  Source Directory: {}", session.source_directory.display())?;
    writeln!(
        writer,
        "  Destination Directory: {}",
        session.destination_directory.display()
    )?;
    writeln!(writer, "  Configuration File: {}", session.config_file.display())?;
    writeln!(writer, "  Worker Threads: {}", session.worker_count)?;
    if session.cancelled {
        writeln!(writer, "  Status: cancelled before completion")?;
    }
    writeln!(writer)?;

    writeln!(writer, "File Processing Summary:")?;
    writeln!(writer, "  Total Files Found: {}", counts.total_files)?;
    writeln!(writer, "  Successfully Processed: {}", counts.accepted_files)?;
    writeln!(writer, "  Image Exports Created: {}", counts.exported_files)?;
    writeln!(writer, "  Skipped Files: {}", counts.skipped_files)?;
    writeln!(writer, "  Duplicate Files: {}", counts.duplicate_files)?;
    writeln!(writer, "  Files with Errors: {}", counts.error_files)?;
    writeln!(writer, "  Warnings: {}", counts.warnings)?;
    writeln!(writer)?;

    writeln!(writer, "Data Processing Summary:")?;
    writeln!(
        writer,
        "  Total Data Size: {} ({} bytes)",
        sizes.total_human, sizes.total_bytes
    )?;
    writeln!(
        writer,
        "  Processed Data Size: {} ({} bytes)",
        sizes.processed_human, sizes.processed_bytes
    )?;
    writeln!(
        writer,
        "  Copied Data Size: {} ({} bytes)",
        sizes.copied_human, sizes.copied_bytes
    )?;
    writeln!(writer)?;

    writeln!(writer, "Performance Metrics:")?;
    writeln!(
        writer,
        "  Processing Speed: {:.2} files/second",
        perf.files_per_second
    )?;
    writeln!(
        writer,
        "  Peak Speed: {:.2} files/second",
        perf.peak_files_per_second
    )?;
    writeln!(writer, "  Data Throughput: {}", perf.throughput_human)?;
    writeln!(writer)?;

    if let Some(index) = &report.index {
        writeln!(writer, "Index:")?;
        writeln!(
            writer,
            "  Records: {} ({})",
            index.records,
            format_bytes(index.total_bytes)
        )?;
        writeln!(writer)?;
    }

    writeln!(writer, "Category Breakdown:")?;
    for (category, entry) in &report.category_breakdown {
        writeln!(
            writer,
            "  {}: {} files ({})",
            category, entry.count, entry.size_human
        )?;
    }

    if !report.error_summary.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Error Summary:")?;
        for group in &report.error_summary {
            writeln!(writer, "  {}: {} occurrences", group.kind, group.count)?;
            if !group.sample_files.is_empty() {
                writeln!(writer, "    Sample files:")?;
                for file in &group.sample_files {
                    writeln!(writer, "      - {}", file.display())?;
                }
            }
        }
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "For detailed logs, check the zensort-logs directory."
    )?;

    Ok(())
}
