//! Error taxonomy for orchestration.
//!
//! Run-level errors abort before any worktree exists. Issue-local failures
//! never surface here; they are recorded as a
//! [`FailureReason`](crate::models::FailureReason) on the issue's RunRecord.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Circular dependency detected among issues: {}", issues.join(", "))]
    CycleDetected { issues: Vec<String> },

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    InvalidConfig(Vec<String>),

    #[error("Failed to create worktree for '{issue_id}': {message}")]
    WorktreeCreation { issue_id: String, message: String },

    #[error("index.lock collision while merging '{issue_id}': {message}")]
    IndexLockCollision { issue_id: String, message: String },

    #[error("Another weave run holds {}", .0.display())]
    RunLocked(PathBuf),
}
