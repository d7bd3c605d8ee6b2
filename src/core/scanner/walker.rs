//! Directory walking implementation using walkdir.

use super::{filter::SkipRules, WorkItem};
use crate::core::pipeline::CancellationToken;
use crate::error::ScanError;
use crate::events::{Event, EventSender, ScanEvent};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Totals from one traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total_files: usize,
    pub total_bytes: u64,
    pub warnings: usize,
    /// Traversal stopped early because of cancellation or a closed consumer
    pub stopped: bool,
}

/// Single-pass, depth-first source walker
pub struct Scanner<'a> {
    rules: &'a SkipRules,
    follow_symlinks: bool,
    excluded: Vec<PathBuf>,
}

impl<'a> Scanner<'a> {
    pub fn new(rules: &'a SkipRules) -> Self {
        Self {
            rules,
            follow_symlinks: false,
            excluded: Vec::new(),
        }
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Never descend into `path` (e.g. a destination nested in the source)
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// Check that `root` is a readable directory
    pub fn validate_root(root: &Path) -> Result<(), ScanError> {
        let metadata = std::fs::metadata(root).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScanError::DirectoryNotFound {
                    path: root.to_path_buf(),
                }
            } else {
                ScanError::Unreadable {
                    path: root.to_path_buf(),
                    message: e.to_string(),
                }
            }
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        std::fs::read_dir(root).map_err(|e| ScanError::Unreadable {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Walk `root`, handing each candidate file to `emit`.
    ///
    /// Directories matched by the skip rules are not descended into.
    /// `emit` returns `false` to stop the walk. Unreadable entries produce
    /// a warning event and are otherwise ignored.
    pub fn scan<F>(
        &self,
        root: &Path,
        cancel: &CancellationToken,
        events: &EventSender,
        mut emit: F,
    ) -> Result<ScanSummary, ScanError>
    where
        F: FnMut(WorkItem) -> bool,
    {
        Self::validate_root(root)?;
        events.send(Event::Scan(ScanEvent::Started {
            source: root.to_path_buf(),
        }));

        let rules = self.rules;
        let excluded = &self.excluded;
        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !(rules.prunes_directory(entry.file_name())
                        || excluded.iter().any(|p| p.as_path() == entry.path()))
            });

        let mut summary = ScanSummary::default();

        for entry_result in walker {
            if cancel.is_cancelled() {
                debug!("Scan stopped by cancellation");
                summary.stopped = true;
                break;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warn!(path = %path.display(), error = %e, "Unreadable entry");
                    summary.warnings += 1;
                    events.send(Event::Scan(ScanEvent::Warning {
                        path,
                        message: e.to_string(),
                    }));
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            let size = match std::fs::metadata(path) {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat entry");
                    summary.warnings += 1;
                    events.send(Event::Scan(ScanEvent::Warning {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }));
                    continue;
                }
            };

            let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            summary.total_files += 1;
            summary.total_bytes += size;

            let item = WorkItem {
                path: path.to_path_buf(),
                relative,
                size,
            };
            if !emit(item) {
                summary.stopped = true;
                break;
            }
        }

        events.send(Event::Scan(ScanEvent::Completed {
            total_files: summary.total_files,
            total_bytes: summary.total_bytes,
        }));

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SkipFiles;
    use crate::events::{null_sender, EventChannel};
    use std::fs;
    use tempfile::TempDir;

    fn rules() -> SkipRules {
        SkipRules::new(&SkipFiles::default()).unwrap()
    }

    fn collect(root: &Path, cancel: &CancellationToken) -> (Vec<WorkItem>, ScanSummary) {
        let rules = rules();
        let mut items = Vec::new();
        let summary = Scanner::new(&rules)
            .scan(root, cancel, &null_sender(), |item| {
                items.push(item);
                true
            })
            .unwrap();
        items.sort_by(|a, b| a.relative.cmp(&b.relative));
        (items, summary)
    }

    #[test]
    fn scan_empty_directory_finds_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (items, summary) = collect(temp_dir.path(), &CancellationToken::new());

        assert!(items.is_empty());
        assert_eq!(summary.total_files, 0);
    }

    #[test]
    fn scan_finds_nested_files_with_sizes() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        fs::write(temp_dir.path().join("top.txt"), b"12345").unwrap();
        fs::write(temp_dir.path().join("a/b/deep.jpg"), b"123").unwrap();

        let (items, summary) = collect(temp_dir.path(), &CancellationToken::new());

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].relative, PathBuf::from("a/b/deep.jpg"));
        assert_eq!(items[0].size, 3);
        assert_eq!(summary.total_bytes, 8);
    }

    #[test]
    fn scan_does_not_descend_into_skipped_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join("node_modules/pkg/a.png"), b"x").unwrap();
        fs::write(temp_dir.path().join(".git/HEAD"), b"x").unwrap();
        fs::write(temp_dir.path().join("keep.png"), b"x").unwrap();

        let (items, _) = collect(temp_dir.path(), &CancellationToken::new());

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relative, PathBuf::from("keep.png"));
    }

    #[test]
    fn scan_skips_excluded_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("organized");
        fs::create_dir_all(nested.join("Images")).unwrap();
        fs::write(nested.join("Images/copy.png"), b"x").unwrap();
        fs::write(temp_dir.path().join("original.png"), b"x").unwrap();
        let rules = rules();
        let mut items = Vec::new();

        Scanner::new(&rules)
            .exclude(&nested)
            .scan(temp_dir.path(), &CancellationToken::new(), &null_sender(), |item| {
                items.push(item);
                true
            })
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relative, PathBuf::from("original.png"));
    }

    #[test]
    fn scan_reports_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let rules = rules();
        let result = Scanner::new(&rules).scan(
            &temp_dir.path().join("missing"),
            &CancellationToken::new(),
            &null_sender(),
            |_| true,
        );
        assert!(matches!(result, Err(ScanError::DirectoryNotFound { .. })));
    }

    #[test]
    fn scan_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            Scanner::validate_root(&file),
            Err(ScanError::NotADirectory { .. })
        ));
    }

    #[test]
    fn cancelled_scan_emits_nothing() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(temp_dir.path().join(format!("{}.txt", i)), b"x").unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (items, summary) = collect(temp_dir.path(), &cancel);
        assert!(items.is_empty());
        assert!(summary.stopped);
    }

    #[test]
    fn consumer_can_stop_the_walk() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(temp_dir.path().join(format!("{}.txt", i)), b"x").unwrap();
        }
        let rules = rules();
        let mut seen = 0;
        let summary = Scanner::new(&rules)
            .scan(temp_dir.path(), &CancellationToken::new(), &null_sender(), |_| {
                seen += 1;
                seen < 2
            })
            .unwrap();

        assert_eq!(seen, 2);
        assert!(summary.stopped);
    }

    #[test]
    fn scan_emits_start_and_completion_events() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"abc").unwrap();
        let (sender, receiver) = EventChannel::new();
        let rules = rules();

        Scanner::new(&rules)
            .scan(temp_dir.path(), &CancellationToken::new(), &sender, |_| true)
            .unwrap();
        drop(sender);

        let events: Vec<Event> = receiver.iter().collect();
        assert!(matches!(events.first(), Some(Event::Scan(ScanEvent::Started { .. }))));
        assert!(matches!(
            events.last(),
            Some(Event::Scan(ScanEvent::Completed {
                total_files: 1,
                total_bytes: 3
            }))
        ));
    }
}
