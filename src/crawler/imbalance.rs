//! Post-run imbalance check over the keyword directories.
//!
//! Keywords whose directory holds fewer than half the average number of files
//! are flagged so they can be removed and crawled again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Directories holding less than this share of the mean are flagged.
const UNDERSIZED_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct ImbalanceReport {
    /// Every keyword directory with its file count, sorted by path.
    pub counts: Vec<(PathBuf, usize)>,
    pub mean: f64,
    pub undersized: Vec<(PathBuf, usize)>,
}

impl ImbalanceReport {
    pub fn is_balanced(&self) -> bool {
        self.undersized.is_empty()
    }
}

/// Number of regular files directly inside `dir` (markers included).
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing path in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// Counts files in every directory under `root` and flags the undersized ones.
/// Returns `None` when there is nothing to compare.
pub fn check(root: &Path) -> io::Result<Option<ImbalanceReport>> {
    if !root.is_dir() {
        return Ok(None);
    }

    let dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    if dirs.is_empty() {
        return Ok(None);
    }

    let mut counts: Vec<(PathBuf, usize)> = dirs
        .into_par_iter()
        .map(|dir| {
            let count = count_files(&dir);
            (dir, count)
        })
        .collect();
    counts.sort();

    let mean = counts.iter().map(|(_, n)| *n as f64).sum::<f64>() / counts.len() as f64;
    let undersized = find_undersized(&counts, mean);

    info!(
        "Checked {} keyword directories, mean {:.1} files, {} undersized",
        counts.len(),
        mean,
        undersized.len()
    );
    Ok(Some(ImbalanceReport { counts, mean, undersized }))
}

fn find_undersized(counts: &[(PathBuf, usize)], mean: f64) -> Vec<(PathBuf, usize)> {
    counts
        .iter()
        .filter(|(_, n)| (*n as f64) < mean * UNDERSIZED_RATIO)
        .cloned()
        .collect()
}

/// Deletes the given directories; failures are logged and skipped.
/// Returns how many were removed.
pub fn remove_directories(dirs: &[(PathBuf, usize)]) -> usize {
    dirs.iter()
        .filter(|(dir, _)| match fs::remove_dir_all(dir) {
            Ok(()) => {
                info!("Removed {}", dir.display());
                true
            }
            Err(e) => {
                warn!("Failed to remove {}: {}", dir.display(), e);
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populate(root: &Path, name: &str, files: usize) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..files {
            fs::write(dir.join(format!("google_{:04}.jpg", i)), b"x").unwrap();
        }
    }

    #[test]
    fn test_flags_directories_below_half_the_mean() {
        let root = tempdir().unwrap();
        populate(root.path(), "A", 10);
        populate(root.path(), "B", 10);
        populate(root.path(), "C", 2);

        let report = check(root.path()).unwrap().unwrap();
        assert!((report.mean - 22.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.undersized, vec![(root.path().join("C"), 2)]);
        assert!(!report.is_balanced());
    }

    #[test]
    fn test_nested_entries_are_not_counted() {
        let root = tempdir().unwrap();
        populate(root.path(), "A", 3);
        fs::create_dir_all(root.path().join("A/nested")).unwrap();
        fs::write(root.path().join("A/nested/deep.jpg"), b"x").unwrap();
        fs::write(root.path().join("A/google_done"), b"").unwrap();

        assert_eq!(count_files(&root.path().join("A")), 4);
    }

    #[test]
    fn test_empty_root_has_nothing_to_report() {
        let root = tempdir().unwrap();
        assert_eq!(check(root.path()).unwrap(), None);
        assert_eq!(check(&root.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn test_remove_directories() {
        let root = tempdir().unwrap();
        populate(root.path(), "A", 1);
        let flagged = vec![(root.path().join("A"), 1), (root.path().join("gone"), 0)];

        assert_eq!(remove_directories(&flagged), 1);
        assert!(!root.path().join("A").exists());
    }
}
