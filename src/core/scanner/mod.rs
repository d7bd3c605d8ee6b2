//! # Scanner Module
//!
//! Discovers candidate files under the source root.
//!
//! One depth-first pass with `walkdir`. Directories whose name contains
//! a `skip_files.directories` substring are pruned; every other
//! non-directory entry becomes a [`WorkItem`]. Extension and name rules
//! are applied per file by the workers through [`SkipRules::check`], so
//! skipped files are still counted and reported.

mod filter;
mod walker;

pub use filter::SkipRules;
pub use walker::{ScanSummary, Scanner};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file handed from the scanner to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Absolute path in the source tree
    pub path: PathBuf,
    /// Path below the source root
    pub relative: PathBuf,
    /// Size at scan time
    pub size: u64,
}
