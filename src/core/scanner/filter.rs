//! Skip rules for the scanner and workers.

use crate::config::SkipFiles;
use crate::error::ConfigError;
use crate::events::SkipReason;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::ffi::OsStr;
use std::path::Path;

/// Compiled `skip_files` configuration
#[derive(Debug, Clone)]
pub struct SkipRules {
    /// Lowercase, with leading dot
    extensions: Vec<String>,
    patterns: GlobSet,
    directories: Vec<String>,
}

impl SkipRules {
    /// Compile the configured rules
    pub fn new(skip: &SkipFiles) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &skip.patterns {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::Invalid {
                field: "skip_files.patterns".to_string(),
                reason: format!("{:?}: {}", pattern, e),
            })?;
            builder.add(glob);
        }
        let patterns = builder.build().map_err(|e| ConfigError::Invalid {
            field: "skip_files.patterns".to_string(),
            reason: e.to_string(),
        })?;

        let extensions = skip
            .extensions
            .iter()
            .map(|e| {
                let e = e.to_lowercase();
                if e.starts_with('.') {
                    e
                } else {
                    format!(".{}", e)
                }
            })
            .collect();

        Ok(Self {
            extensions,
            patterns,
            directories: skip
                .directories
                .iter()
                .filter(|d| !d.is_empty())
                .cloned()
                .collect(),
        })
    }

    /// Whether a directory with this name is never descended into
    pub fn prunes_directory(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        self.directories.iter().any(|d| name.contains(d.as_str()))
    }

    /// Decide whether a file is skipped.
    ///
    /// `relative` is the file's path below the source root; directory
    /// rules only look at that part so the root's own location never
    /// matters.
    pub fn check(&self, relative: &Path) -> Option<SkipReason> {
        let ext = relative
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        if !ext.is_empty() && (self.extensions.contains(&ext) || is_numbered_thumb(&ext)) {
            return Some(SkipReason::Extension);
        }

        if let Some(parent) = relative.parent() {
            if parent
                .components()
                .any(|c| self.prunes_directory(c.as_os_str()))
            {
                return Some(SkipReason::Directory);
            }
        }

        if let Some(name) = relative.file_name() {
            if self.patterns.is_match(Path::new(name)) {
                return Some(SkipReason::Pattern);
            }
        }

        None
    }
}

/// `.thumb`, `.thumb0`, `.thumb12`, ...
fn is_numbered_thumb(ext: &str) -> bool {
    ext.strip_prefix(".thumb")
        .map(|rest| rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}
