use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::merge::MergeResult;

/// Status of one issue within a run.
///
/// State machine transitions:
/// - `Pending` -> `Scheduled` (assigned to a wave)
/// - `Scheduled` -> `Running` (worktree provisioned, worker launched)
/// - `Running` -> `AwaitingMerge` (worker succeeded)
/// - `AwaitingMerge` -> `Merging` (merge lock acquired)
/// - `Merging` -> `Completed` | `AwaitingMerge` (conflict retry)
/// - any non-terminal -> `Failed`
/// - `Pending` | `Scheduled` -> `Abandoned` (a dependency failed)
/// - `Completed`, `Failed` and `Abandoned` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    Scheduled,
    Running,
    AwaitingMerge,
    Merging,
    Completed,
    Failed,
    Abandoned,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Pending => "Pending",
            RunStatus::Scheduled => "Scheduled",
            RunStatus::Running => "Running",
            RunStatus::AwaitingMerge => "AwaitingMerge",
            RunStatus::Merging => "Merging",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
            RunStatus::Abandoned => "Abandoned",
        };
        f.write_str(label)
    }
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Abandoned
        )
    }

    /// Check if transitioning from the current status to `new_status` is valid.
    ///
    /// Same-status transitions are no-ops and always valid.
    pub fn can_transition_to(&self, new_status: &RunStatus) -> bool {
        if self == new_status {
            return true;
        }

        match self {
            RunStatus::Pending => matches!(
                new_status,
                RunStatus::Scheduled | RunStatus::Abandoned | RunStatus::Failed
            ),
            RunStatus::Scheduled => matches!(
                new_status,
                RunStatus::Running | RunStatus::Abandoned | RunStatus::Failed
            ),
            RunStatus::Running => {
                matches!(new_status, RunStatus::AwaitingMerge | RunStatus::Failed)
            }
            RunStatus::AwaitingMerge => {
                matches!(new_status, RunStatus::Merging | RunStatus::Failed)
            }
            RunStatus::Merging => matches!(
                new_status,
                RunStatus::Completed | RunStatus::AwaitingMerge | RunStatus::Failed
            ),
            RunStatus::Completed | RunStatus::Failed | RunStatus::Abandoned => false,
        }
    }

    /// Attempt to transition to a new status, returning an error if invalid.
    pub fn try_transition(&self, new_status: RunStatus) -> Result<RunStatus> {
        if self.can_transition_to(&new_status) {
            Ok(new_status)
        } else {
            bail!("Invalid run status transition: {self} -> {new_status}")
        }
    }
}

/// Why an issue ended `Failed` or `Abandoned`, with enough context to
/// diagnose without re-running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureReason {
    WorktreeCreation { message: String },
    WorkerTimeout { timeout_secs: u64 },
    WorkerFailure { reason: String },
    MergeConflict {
        conflict_files: Vec<String>,
        attempts: u32,
    },
    LeakedFiles { paths: Vec<String> },
    IndexLockCollision { message: String },
    MergeError { message: String },
    Cancelled,
    DependencyFailed { dependency: String },
}

impl FailureReason {
    /// Taxonomy name used in reports
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::WorktreeCreation { .. } => "WorktreeCreationFailure",
            FailureReason::WorkerTimeout { .. } => "WorkerTimeout",
            FailureReason::WorkerFailure { .. } => "WorkerFailure",
            FailureReason::MergeConflict { .. } => "MergeConflict",
            FailureReason::LeakedFiles { .. } => "LeakedFiles",
            FailureReason::IndexLockCollision { .. } => "IndexLockCollision",
            FailureReason::MergeError { .. } => "MergeError",
            FailureReason::Cancelled => "Cancelled",
            FailureReason::DependencyFailed { .. } => "DependencyFailed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::WorktreeCreation { message } => {
                write!(f, "worktree creation failed: {message}")
            }
            FailureReason::WorkerTimeout { timeout_secs } => {
                write!(f, "worker exceeded {timeout_secs}s timeout")
            }
            FailureReason::WorkerFailure { reason } => write!(f, "worker failed: {reason}"),
            FailureReason::MergeConflict {
                conflict_files,
                attempts,
            } => write!(
                f,
                "merge conflict after {attempts} attempt(s) in: {}",
                conflict_files.join(", ")
            ),
            FailureReason::LeakedFiles { paths } => write!(
                f,
                "files modified outside the worktree: {}",
                paths.join(", ")
            ),
            FailureReason::IndexLockCollision { message } => {
                write!(f, "index.lock collision during merge: {message}")
            }
            FailureReason::MergeError { message } => write!(f, "merge error: {message}"),
            FailureReason::Cancelled => write!(f, "run cancelled"),
            FailureReason::DependencyFailed { dependency } => {
                write!(f, "dependency '{dependency}' did not complete")
            }
        }
    }
}

/// Per-issue execution record persisted after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub issue_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave: Option<usize>,
    /// Number of times a worker was launched for this issue
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Commit on the issue branch produced by the worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_output_ref: Option<String>,
    /// Worktree path while one is live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_result: Option<MergeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl RunRecord {
    pub fn new(issue_id: impl Into<String>) -> Self {
        Self {
            issue_id: issue_id.into(),
            status: RunStatus::Pending,
            wave: None,
            attempt_count: 0,
            started_at: None,
            ended_at: None,
            worker_output_ref: None,
            worktree: None,
            merge_result: None,
            failure: None,
        }
    }

    /// Move to `new_status`, stamping start/end times.
    pub fn transition_to(&mut self, new_status: RunStatus) -> Result<()> {
        let next = self.status.try_transition(new_status).map_err(|e| {
            anyhow::anyhow!("Issue '{}': {e}", self.issue_id)
        })?;

        if next == RunStatus::Running && self.status != RunStatus::Running {
            self.attempt_count += 1;
            if self.started_at.is_none() {
                self.started_at = Some(Utc::now());
            }
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
            self.worktree = None;
        }

        self.status = next;
        Ok(())
    }

    pub fn fail(&mut self, reason: FailureReason) -> Result<()> {
        self.transition_to(RunStatus::Failed)?;
        self.failure = Some(reason);
        Ok(())
    }

    pub fn abandon(&mut self, dependency: &str) -> Result<()> {
        self.transition_to(RunStatus::Abandoned)?;
        self.failure = Some(FailureReason::DependencyFailed {
            dependency: dependency.to_string(),
        });
        Ok(())
    }

    /// Whether this record is resumable straight into the merge step
    pub fn has_pending_merge(&self) -> bool {
        matches!(self.status, RunStatus::AwaitingMerge | RunStatus::Merging)
            && self.worker_output_ref.is_some()
    }

    /// Reset an interrupted record so a resumed run schedules it again.
    ///
    /// Bypasses the transition table on purpose: this only happens while
    /// loading state left behind by a crashed process.
    pub fn reset_interrupted(&mut self) {
        self.status = RunStatus::Pending;
        self.worktree = None;
        self.worker_output_ref = None;
        self.merge_result = None;
    }
}
