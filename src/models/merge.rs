use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of integrating one issue branch into the target branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeOutcome {
    /// Changes landed on the target branch (or were already there)
    Clean,
    /// Rebase onto the target tip hit conflicts; target untouched
    Conflict,
    /// Files changed outside the worktree; target untouched
    LeakedFiles,
    /// Merge refused or interrupted before it touched the target
    Aborted,
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeOutcome::Clean => write!(f, "Clean"),
            MergeOutcome::Conflict => write!(f, "Conflict"),
            MergeOutcome::LeakedFiles => write!(f, "LeakedFiles"),
            MergeOutcome::Aborted => write!(f, "Aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub outcome: MergeOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
    /// Non-empty only on `Conflict`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflict_files: Vec<String>,
    /// Non-empty only on `LeakedFiles`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaked_files: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Target branch tip after a clean merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_commit: Option<String>,
}

impl MergeResult {
    pub fn clean(files_changed: Vec<String>, merged_commit: String) -> Self {
        Self {
            outcome: MergeOutcome::Clean,
            files_changed,
            conflict_files: Vec::new(),
            leaked_files: Vec::new(),
            retry_count: 0,
            merged_commit: Some(merged_commit),
        }
    }

    pub fn conflict(conflict_files: Vec<String>) -> Self {
        Self {
            outcome: MergeOutcome::Conflict,
            files_changed: Vec::new(),
            conflict_files,
            leaked_files: Vec::new(),
            retry_count: 0,
            merged_commit: None,
        }
    }

    pub fn leaked(leaked_files: Vec<String>) -> Self {
        Self {
            outcome: MergeOutcome::LeakedFiles,
            files_changed: Vec::new(),
            conflict_files: Vec::new(),
            leaked_files,
            retry_count: 0,
            merged_commit: None,
        }
    }

    pub fn aborted() -> Self {
        Self {
            outcome: MergeOutcome::Aborted,
            files_changed: Vec::new(),
            conflict_files: Vec::new(),
            leaked_files: Vec::new(),
            retry_count: 0,
            merged_commit: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.outcome == MergeOutcome::Clean
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}
