//! Detection of writes that escaped a worktree into the main checkout
//!
//! Each issue's worker runs inside a window bounded by two snapshots of the
//! main checkout. A leaked path is blamed on an issue only if it appeared
//! between that issue's snapshots, so a worker that finished before the
//! path showed up is never blamed for it. Workers whose windows overlap
//! when the path appears are all blamed.

use std::collections::BTreeSet;

/// Main checkout paths seen when one worker started and when it returned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakWindow {
    pub before: BTreeSet<String>,
    pub after: BTreeSet<String>,
}

impl LeakWindow {
    pub fn new(before: BTreeSet<String>, after: BTreeSet<String>) -> Self {
        Self { before, after }
    }

    /// Paths present when the worker returned but not when it started
    pub fn appeared(&self) -> impl Iterator<Item = &String> {
        self.after.difference(&self.before)
    }
}

/// Separates leaks from paths that were already there or belong to weave
#[derive(Debug, Clone, Default)]
pub struct LeakDetector {
    /// Paths present at run start
    baseline: BTreeSet<String>,
    /// Path prefixes owned by weave itself
    ignored_prefixes: Vec<String>,
}

impl LeakDetector {
    pub fn new(baseline: BTreeSet<String>, ignored_prefixes: Vec<String>) -> Self {
        let ignored_prefixes = ignored_prefixes
            .into_iter()
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            baseline,
            ignored_prefixes,
        }
    }

    fn is_ignored(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        self.ignored_prefixes
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/")))
    }

    fn is_unexplained(&self, path: &str) -> bool {
        !self.baseline.contains(path) && !self.is_ignored(path)
    }

    /// Paths that are neither in the baseline nor under weave's own dirs
    pub fn unexplained(&self, paths: &BTreeSet<String>) -> BTreeSet<String> {
        paths
            .iter()
            .filter(|p| self.is_unexplained(p))
            .cloned()
            .collect()
    }

    /// Leaks attributable to the issue that owns `window`.
    ///
    /// A path counts when it appeared inside the window and is still present
    /// in `current`.
    pub fn leaks_in_window(&self, window: &LeakWindow, current: &BTreeSet<String>) -> Vec<String> {
        window
            .appeared()
            .filter(|p| current.contains(*p) && self.is_unexplained(p))
            .cloned()
            .collect()
    }
}
