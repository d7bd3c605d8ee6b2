//! Exclusive claiming of destination paths.
//!
//! A path is claimed by creating it with `create_new`, so two workers
//! routed to the same name can never both win. The loser retries with
//! `{stem} -- N{ext}` for N = 1, 2, ...

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on suffix attempts for a single name
const MAX_ATTEMPTS: u32 = 100_000;

/// A freshly created, empty destination file
#[derive(Debug)]
pub struct ClaimedFile {
    pub file: File,
    /// Path relative to the destination root
    pub relative: PathBuf,
    /// Absolute path on disk
    pub absolute: PathBuf,
}

/// Create the file at `root/relative`, or the first free suffixed variant.
///
/// Missing parent directories are created.
pub fn claim(root: &Path, relative: &Path) -> io::Result<ClaimedFile> {
    if let Some(parent) = relative.parent() {
        fs::create_dir_all(root.join(parent))?;
    }

    for attempt in 0..MAX_ATTEMPTS {
        let candidate = if attempt == 0 {
            relative.to_path_buf()
        } else {
            suffixed(relative, attempt)
        };
        let absolute = root.join(&candidate);

        match OpenOptions::new().write(true).create_new(true).open(&absolute) {
            Ok(file) => {
                return Ok(ClaimedFile {
                    file,
                    relative: candidate,
                    absolute,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {}", relative.display()),
    ))
}

/// `dir/{stem} -- {n}{ext}`
pub fn suffixed(path: &Path, n: u32) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default();
    let mut name = OsString::from(stem);
    name.push(format!(" -- {}", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(
            suffixed(Path::new("Images/a.jpg"), 1),
            PathBuf::from("Images/a -- 1.jpg")
        );
        assert_eq!(suffixed(Path::new("README"), 2), PathBuf::from("README -- 2"));
        assert_eq!(
            suffixed(Path::new("x/.secret.png"), 3),
            PathBuf::from("x/.secret -- 3.png")
        );
    }

    #[test]
    fn claim_creates_parents_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let claimed = claim(temp_dir.path(), Path::new("Documents/PDF/a.pdf")).unwrap();

        assert_eq!(claimed.relative, PathBuf::from("Documents/PDF/a.pdf"));
        assert!(claimed.absolute.is_file());
    }

    #[test]
    fn claim_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("Unknown")).unwrap();
        fs::write(temp_dir.path().join("Unknown/a.bin"), b"keep").unwrap();

        let claimed = claim(temp_dir.path(), Path::new("Unknown/a.bin")).unwrap();
        assert_eq!(claimed.relative, PathBuf::from("Unknown/a -- 1.bin"));

        let again = claim(temp_dir.path(), Path::new("Unknown/a.bin")).unwrap();
        assert_eq!(again.relative, PathBuf::from("Unknown/a -- 2.bin"));

        assert_eq!(fs::read(temp_dir.path().join("Unknown/a.bin")).unwrap(), b"keep");
    }

    #[test]
    fn concurrent_claims_get_distinct_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let root = root.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    claim(&root, Path::new("Unknown/same.txt")).unwrap().relative
                })
            })
            .collect();

        let claimed: HashSet<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(claimed.len(), 8);
    }
}
