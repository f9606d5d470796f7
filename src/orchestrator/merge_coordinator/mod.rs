//! Merge coordinator: the single critical section for the target branch
//!
//! Every integration into the target branch happens here, one at a time.
//! An in-process mutex serializes this run's issues and a lock file keeps
//! other processes out.
//!
//! Per attempt, under the lock:
//! 1. Leak check of the main checkout against the issue's worker window
//!    (never retried)
//! 2. Idempotence check: branch head already in the target's history
//! 3. Rebase the issue branch onto the current target tip (conflict: abort, retry)
//! 4. Fast-forward or merge-commit into the target

mod leak;
mod lock;


pub use leak::{LeakDetector, LeakWindow};
pub use lock::MergeLock;

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::OrchestratorError;
use crate::git::{
    changed_files, checkout_paths, integrate_branch, is_ancestor, mentions_index_lock, rebase_onto,
    rev_parse, RebaseOutcome,
};
use crate::models::{MergeOutcome, MergeResult};
use crate::plan::MergeStyle;

/// How long to wait for another process's merge lock
const FILE_LOCK_TIMEOUT: Duration = Duration::from_secs(600);

/// Coordinator settings fixed for the whole run
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub repo_root: PathBuf,
    pub lock_path: PathBuf,
    pub target_branch: String,
    pub style: MergeStyle,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

/// One issue branch ready to integrate
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub issue_id: String,
    pub worktree_path: PathBuf,
    pub branch_name: String,
    /// Main checkout snapshots around this run's worker; `None` when the
    /// output came from an earlier run
    pub leak_window: Option<LeakWindow>,
}

/// Progress reported while a merge runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeProgress {
    /// The lock is held and attempt `attempt` (0-based) begins
    Started { attempt: u32 },
    /// Attempt conflicted; the lock is released and attempt `attempt` follows
    Retrying {
        attempt: u32,
        conflict_files: Vec<String>,
    },
}

pub struct MergeCoordinator {
    config: CoordinatorConfig,
    detector: LeakDetector,
    gate: Mutex<()>,
    shutting_down: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
    merges: AtomicUsize,
}

impl MergeCoordinator {
    /// `detector` carries the main checkout's dirty set captured at run start
    pub fn new(config: CoordinatorConfig, detector: LeakDetector) -> Self {
        Self {
            config,
            detector,
            gate: Mutex::new(()),
            shutting_down: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            merges: AtomicUsize::new(0),
        }
    }

    /// Integrate one issue branch.
    ///
    /// Conflicts are retried up to `max_retries` times against the latest
    /// target tip, releasing the lock between attempts. Leaks are never
    /// retried. Errors are git failures; an `index.lock` failure comes back
    /// as [`OrchestratorError::IndexLockCollision`].
    pub fn merge(
        &self,
        request: &MergeRequest,
        observer: &dyn Fn(MergeProgress),
    ) -> Result<MergeResult> {
        let mut attempt = 0;
        loop {
            let result = {
                let _gate = self.lock_gate();
                // Checked under the gate so a queued merge cannot slip past wait_idle
                if self.shutting_down.load(Ordering::SeqCst) {
                    info!(issue_id = %request.issue_id, "Merge refused during shutdown");
                    return Ok(MergeResult::aborted().with_retry_count(attempt));
                }
                let _file_lock = MergeLock::acquire(&self.config.lock_path, FILE_LOCK_TIMEOUT)?;
                let _active = ActiveMerge::enter(self);

                observer(MergeProgress::Started { attempt });
                self.attempt(request)
                    .map_err(|e| self.classify(request, e))?
            };

            let result = result.with_retry_count(attempt);
            match result.outcome {
                MergeOutcome::Conflict if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        issue_id = %request.issue_id,
                        attempt,
                        conflicts = ?result.conflict_files,
                        "Merge conflict, retrying against latest target"
                    );
                    observer(MergeProgress::Retrying {
                        attempt,
                        conflict_files: result.conflict_files.clone(),
                    });
                    std::thread::sleep(self.config.retry_backoff);
                }
                _ => return Ok(result),
            }
        }
    }

    fn attempt(&self, request: &MergeRequest) -> Result<MergeResult> {
        let root = &self.config.repo_root;
        let target = &self.config.target_branch;

        if let Some(window) = &request.leak_window {
            let current = checkout_paths(root).context("Failed to read main checkout status")?;
            let leaks = self.detector.leaks_in_window(window, &current);
            if !leaks.is_empty() {
                error!(
                    issue_id = %request.issue_id,
                    paths = ?leaks,
                    "Files leaked outside the worktree; target branch left untouched"
                );
                return Ok(MergeResult::leaked(leaks));
            }
        }

        let head = rev_parse(&request.branch_name, root)?;
        if is_ancestor(&head, target, root)? {
            let tip = rev_parse(target, root)?;
            info!(
                issue_id = %request.issue_id,
                "Branch already integrated, nothing to apply"
            );
            return Ok(MergeResult::clean(Vec::new(), tip));
        }

        if let RebaseOutcome::Conflict(files) = rebase_onto(&request.worktree_path, target)? {
            return Ok(MergeResult::conflict(files));
        }

        let before = rev_parse(target, root)?;
        let tip = integrate_branch(root, &request.branch_name, target, self.config.style)?;
        let files = changed_files(root, &before, &tip)?;
        self.merges.fetch_add(1, Ordering::SeqCst);

        info!(
            issue_id = %request.issue_id,
            files = files.len(),
            commit = %tip,
            "Merged into {target}"
        );
        Ok(MergeResult::clean(files, tip))
    }

    fn classify(&self, request: &MergeRequest, err: anyhow::Error) -> anyhow::Error {
        if mentions_index_lock(&err) {
            error!(
                issue_id = %request.issue_id,
                error = %format!("{err:#}"),
                "index.lock collision inside the merge critical section"
            );
            return OrchestratorError::IndexLockCollision {
                issue_id: request.issue_id.clone(),
                message: format!("{err:#}"),
            }
            .into();
        }
        err
    }

    /// Main checkout paths not explained by the baseline, for bracketing a
    /// worker's run
    pub fn leak_snapshot(&self) -> Result<BTreeSet<String>> {
        let paths = checkout_paths(&self.config.repo_root)
            .context("Failed to snapshot main checkout status")?;
        Ok(self.detector.unexplained(&paths))
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refuse merges that have not yet taken the lock
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Block until no merge holds the lock
    pub fn wait_idle(&self) {
        drop(self.lock_gate());
        debug!("Merge coordinator idle");
    }

    /// Highest number of merges observed inside the critical section at once
    pub fn max_concurrent_merges(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Number of merges that changed the target branch
    pub fn merges_applied(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }
}

/// Counts occupancy of the critical section
struct ActiveMerge<'a> {
    coordinator: &'a MergeCoordinator,
}

impl<'a> ActiveMerge<'a> {
    fn enter(coordinator: &'a MergeCoordinator) -> Self {
        let now = coordinator.active.fetch_add(1, Ordering::SeqCst) + 1;
        coordinator.max_active.fetch_max(now, Ordering::SeqCst);
        Self { coordinator }
    }
}

impl Drop for ActiveMerge<'_> {
    fn drop(&mut self) {
        self.coordinator.active.fetch_sub(1, Ordering::SeqCst);
    }
}
