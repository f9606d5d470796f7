//! Resolved settings for one orchestrator run

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::plan::{MergeStyle, SprintDefinition};

/// How often the control loop wakes to check cancellation and deadlines
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub sprint_name: String,
    pub repo_root: PathBuf,
    /// Relative to `repo_root` unless absolute
    pub worktree_root: PathBuf,
    pub copy_files: Vec<String>,
    pub target_branch: String,
    pub max_workers: usize,
    pub timeout_per_issue: Duration,
    pub max_merge_retries: u32,
    pub merge_style: MergeStyle,
    pub merge_retry_backoff: Duration,
    pub p0_sequential: bool,
    pub conflict_threshold: f64,
    pub cancel_grace: Duration,
    pub poll_interval: Duration,
}

impl OrchestratorConfig {
    /// Settings from a validated sprint file
    pub fn from_sprint(sprint: &SprintDefinition, repo_root: &Path, target_branch: &str) -> Self {
        let options = &sprint.options;
        Self {
            sprint_name: sprint.sprint.name.clone(),
            repo_root: repo_root.to_path_buf(),
            worktree_root: sprint.worktrees.root.clone(),
            copy_files: sprint.worktrees.copy_files.clone(),
            target_branch: target_branch.to_string(),
            max_workers: options.max_workers,
            timeout_per_issue: options.timeout_per_issue(),
            max_merge_retries: options.max_merge_retries,
            merge_style: options.merge_style,
            merge_retry_backoff: options.merge_retry_backoff(),
            p0_sequential: options.p0_sequential,
            conflict_threshold: options.conflict_threshold,
            cancel_grace: options.cancel_grace(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Worktree root as an absolute path
    pub fn worktree_root_abs(&self) -> PathBuf {
        if self.worktree_root.is_absolute() {
            self.worktree_root.clone()
        } else {
            self.repo_root.join(&self.worktree_root)
        }
    }
}
