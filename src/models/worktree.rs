use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A WorktreeHandle represents one isolated checkout created for an issue.
/// Worktrees are stored in {worktree_root}/{issue_id}/ directories on a
/// `weave/{issue_id}` branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeHandle {
    pub issue_id: String,
    /// Absolute path to worktree directory
    pub path: PathBuf,
    /// Git branch name (e.g., "weave/issue-1")
    pub branch_name: String,
    /// Target-branch commit the branch was created from
    pub base_commit: String,
    pub state: WorktreeState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a worktree handle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WorktreeState {
    /// `git worktree add` in progress
    Provisioning,
    /// Checked out and ancillary files copied
    Ready,
    /// A worker is executing inside it
    InUse,
    /// Its branch is being integrated
    Merging,
    /// Directory removed, branch deleted, registry pruned
    Released,
    /// Provisioning or release failed
    Failed,
}

impl WorktreeHandle {
    pub fn new(issue_id: String, path: PathBuf, branch_name: String, base_commit: String) -> Self {
        let now = Utc::now();
        Self {
            issue_id,
            path,
            branch_name,
            base_commit,
            state: WorktreeState::Provisioning,
            created_at: now,
            updated_at: now,
        }
    }

    fn set_state(&mut self, state: WorktreeState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn mark_ready(&mut self) {
        self.set_state(WorktreeState::Ready);
    }

    pub fn mark_in_use(&mut self) {
        self.set_state(WorktreeState::InUse);
    }

    pub fn mark_merging(&mut self) {
        self.set_state(WorktreeState::Merging);
    }

    pub fn mark_released(&mut self) {
        self.set_state(WorktreeState::Released);
    }

    pub fn mark_failed(&mut self) {
        self.set_state(WorktreeState::Failed);
    }

    /// Returns true until the handle has been released
    pub fn is_live(&self) -> bool {
        self.state != WorktreeState::Released
    }

    /// Generates the worktree path for a given issue
    ///
    /// # Returns
    /// A path in the format "{root}/{issue_id}"
    pub fn worktree_path(root: &Path, issue_id: &str) -> PathBuf {
        root.join(issue_id)
    }
}
