//! Project root discovery.
//!
//! Walks up from a starting directory looking for marker files, in three
//! tiers of decreasing confidence. Every ancestor is checked for the first
//! tier before any is checked for the second, so a `.git` far up the tree
//! beats a `README.md` right next to the start.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Version control metadata.
pub const STRONG_INDICATORS: &[&str] = &[".git", ".hg"];
/// Lockfiles and ignore files.
pub const WEAK_INDICATORS: &[&str] = &["package-lock.json", "Cargo.lock", ".gitignore", ".hgignore"];
/// Manifests and readmes.
pub const VERY_WEAK_INDICATORS: &[&str] = &["package.json", "Cargo.toml", "README.md"];

/// Tiered root-directory heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDirLocator {
    /// Highest priority first.
    tiers: Vec<Vec<String>>,
}

impl Default for RootDirLocator {
    fn default() -> Self {
        let tier = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();
        Self {
            tiers: vec![
                tier(STRONG_INDICATORS),
                tier(WEAK_INDICATORS),
                tier(VERY_WEAK_INDICATORS),
            ],
        }
    }
}

impl RootDirLocator {
    pub fn with_tiers(tiers: Vec<Vec<String>>) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &[Vec<String>] {
        &self.tiers
    }

    /// Best-guess project root for `start`, falling back to `start` itself.
    pub fn locate(&self, start: &Path) -> PathBuf {
        self.locate_with(start, |path| path.try_exists())
    }

    /// [`locate`](Self::locate) with a custom existence probe. Probe errors
    /// count as "not there".
    pub fn locate_with<F>(&self, start: &Path, mut exists: F) -> PathBuf
    where
        F: FnMut(&Path) -> io::Result<bool>,
    {
        let start = normalize(start);
        let search_dirs: Vec<&Path> = start
            .ancestors()
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect();

        for (tier_index, tier) in self.tiers.iter().enumerate() {
            for dir in &search_dirs {
                for indicator in tier {
                    let candidate = dir.join(indicator);
                    trace!(path = %candidate.display(), "checking for root indicator");
                    match exists(&candidate) {
                        Ok(true) => {
                            debug!(root = %dir.display(), tier = tier_index, %indicator, "found root directory");
                            return dir.to_path_buf();
                        }
                        Ok(false) => {}
                        Err(e) => trace!(path = %candidate.display(), err = %e, "probe failed; treating as absent"),
                    }
                }
            }
        }

        debug!(start = %start.display(), "no root indicator found; using start directory");
        start
    }
}

/// Locate the root for `start` with the default indicators.
pub fn find_root_dir(start: &Path) -> PathBuf {
    RootDirLocator::default().locate(start)
}

/// Lexically normalize a path: drop `.`, fold `..`, drop trailing separators.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // ".." at the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Memoized root directories, keyed by working directory.
///
/// Entries never expire; a process sees few distinct working directories.
#[derive(Debug, Default)]
pub struct RootDirCache {
    entries: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl RootDirCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cwd: &Path) -> Option<PathBuf> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cwd)
            .cloned()
    }

    pub fn insert(&self, cwd: impl Into<PathBuf>, root: impl Into<PathBuf>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cwd.into(), root.into());
    }

    /// Cached root for `cwd`, locating and remembering it on a miss.
    pub fn get_or_locate(&self, cwd: &Path, locator: &RootDirLocator) -> PathBuf {
        if let Some(root) = self.get(cwd) {
            return root;
        }
        let root = locator.locate(cwd);
        self.insert(cwd, root.clone());
        root
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;

    use super::*;

    /// Probe that answers from a fixed set of existing paths.
    fn probe(existing: &[&str]) -> impl FnMut(&Path) -> io::Result<bool> {
        let existing: HashSet<PathBuf> = existing.iter().map(PathBuf::from).collect();
        move |path| Ok(existing.contains(path))
    }

    #[test]
    fn test_strong_indicator_beats_closer_weak_ones() {
        let root = RootDirLocator::default().locate_with(
            Path::new("/work/repo/packages/app/src"),
            probe(&[
                "/work/repo/.git",
                "/work/repo/packages/app/package.json",
                "/work/repo/packages/app/.gitignore",
            ]),
        );
        assert_eq!(root, PathBuf::from("/work/repo"));
    }

    #[test]
    fn test_closest_match_wins_within_tier() {
        let root = RootDirLocator::default().locate_with(
            Path::new("/work/outer/inner/src"),
            probe(&["/work/outer/.git", "/work/outer/inner/.hg"]),
        );
        assert_eq!(root, PathBuf::from("/work/outer/inner"));
    }

    #[test]
    fn test_weak_tier_beats_very_weak() {
        let root = RootDirLocator::default().locate_with(
            Path::new("/a/b/c"),
            probe(&["/a/b/c/README.md", "/a/Cargo.lock"]),
        );
        assert_eq!(root, PathBuf::from("/a"));
    }

    #[test]
    fn test_very_weak_tier_used_last() {
        let root = RootDirLocator::default()
            .locate_with(Path::new("/a/b/c"), probe(&["/a/b/package.json"]));
        assert_eq!(root, PathBuf::from("/a/b"));
    }

    #[test]
    fn test_falls_back_to_normalized_start() {
        let root = RootDirLocator::default().locate_with(Path::new("/a/./b/../c/"), probe(&[]));
        assert_eq!(root, PathBuf::from("/a/c"));
    }

    #[test]
    fn test_probe_errors_count_as_absent() {
        let root = RootDirLocator::default().locate_with(Path::new("/a/b"), |path| {
            if path.ends_with(".git") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            } else {
                Ok(path == Path::new("/a/.gitignore"))
            }
        });
        assert_eq!(root, PathBuf::from("/a"));
    }

    #[test]
    fn test_filesystem_root_is_searched() {
        let root = RootDirLocator::default().locate_with(Path::new("/a/b"), probe(&["/.git"]));
        assert_eq!(root, PathBuf::from("/"));
    }

    #[test]
    fn test_custom_tiers() {
        let locator = RootDirLocator::with_tiers(vec![vec!["WORKSPACE".to_string()]]);
        let root = locator.locate_with(
            Path::new("/m/n"),
            probe(&["/m/WORKSPACE", "/m/n/.git"]),
        );
        assert_eq!(root, PathBuf::from("/m"));
    }

    #[test]
    fn test_locate_on_real_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let nested = repo.join("crates").join("core");
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Cargo.toml"), "[package]\n").unwrap();

        assert_eq!(find_root_dir(&nested), repo);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../../..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("a/./b")), PathBuf::from("a/b"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize(Path::new(".")), PathBuf::from("."));
    }

    #[test]
    fn test_cache_memoizes_per_cwd() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let cache = RootDirCache::new();
        let locator = RootDirLocator::default();

        assert!(cache.is_empty());
        assert_eq!(cache.get_or_locate(dir.path(), &locator), dir.path());

        // stale entries win until cleared
        cache.insert(dir.path(), "/elsewhere");
        assert_eq!(cache.get_or_locate(dir.path(), &locator), PathBuf::from("/elsewhere"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_eq!(cache.get_or_locate(dir.path(), &locator), dir.path());
    }
}
