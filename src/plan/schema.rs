//! Sprint definition schema and validation
//!
//! A sprint file is TOML:
//!
//! ```toml
//! [sprint]
//! name = "sprint-12"
//! issues = ["A-1", "B-2"]
//!
//! [options]
//! max_workers = 4
//!
//! [worker]
//! command = "agent --issue \"$WEAVE_ISSUE_ID\""
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::validation::{normalize_repo_path, validate_id};

/// Root structure of a sprint file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintDefinition {
    pub sprint: SprintSection,
    #[serde(default)]
    pub options: ExecutionOptions,
    #[serde(default)]
    pub worker: Option<WorkerConfig>,
    #[serde(default)]
    pub worktrees: WorktreeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintSection {
    pub name: String,
    /// Issue ids to run; empty means every issue in `issues_dir`
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default = "default_issues_dir")]
    pub issues_dir: PathBuf,
    /// Branch to integrate into; defaults to the repository's default branch
    #[serde(default)]
    pub target_branch: Option<String>,
}

fn default_issues_dir() -> PathBuf {
    PathBuf::from(".issues")
}

/// How a rebased issue branch lands on the target branch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStyle {
    #[default]
    FastForward,
    MergeCommit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub max_workers: usize,
    pub timeout_per_issue_secs: u64,
    pub max_merge_retries: u32,
    /// Run every P0 issue alone in its own wave
    pub p0_sequential: bool,
    /// Inferred edge when the shared-file score is strictly greater than this
    pub conflict_threshold: f64,
    pub merge_style: MergeStyle,
    pub merge_retry_backoff_ms: u64,
    pub cancel_grace_secs: u64,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            timeout_per_issue_secs: 1800,
            max_merge_retries: 2,
            p0_sequential: true,
            conflict_threshold: 0.0,
            merge_style: MergeStyle::FastForward,
            merge_retry_backoff_ms: 500,
            cancel_grace_secs: 30,
        }
    }
}

impl ExecutionOptions {
    pub fn timeout_per_issue(&self) -> Duration {
        Duration::from_secs(self.timeout_per_issue_secs)
    }

    pub fn merge_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.merge_retry_backoff_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }
}

/// External command that performs the code change for one issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub command: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeSettings {
    /// Directory (relative to the repo root) holding one worktree per issue
    pub root: PathBuf,
    /// Untracked files copied from the main checkout into every worktree
    pub copy_files: Vec<String>,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".worktrees"),
            copy_files: Vec::new(),
        }
    }
}

impl SprintDefinition {
    /// Read and validate a sprint file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sprint file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid sprint file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let definition: SprintDefinition =
            toml::from_str(content).context("Failed to parse sprint TOML")?;
        validate(&definition).map_err(OrchestratorError::InvalidConfig)?;
        Ok(definition)
    }
}

/// Validate a sprint definition, collecting every problem
pub fn validate(definition: &SprintDefinition) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let options = &definition.options;

    if definition.sprint.name.trim().is_empty() {
        errors.push("sprint.name cannot be empty".to_string());
    }

    if options.max_workers == 0 {
        errors.push("options.max_workers must be at least 1".to_string());
    }

    if options.timeout_per_issue_secs == 0 {
        errors.push("options.timeout_per_issue_secs must be greater than 0".to_string());
    }

    if !(0.0..1.0).contains(&options.conflict_threshold) {
        errors.push(format!(
            "options.conflict_threshold must be in [0, 1), got {}",
            options.conflict_threshold
        ));
    }

    let mut seen = HashSet::new();
    for id in &definition.sprint.issues {
        if let Err(e) = validate_id(id) {
            errors.push(format!("sprint.issues: {e}"));
        } else if !seen.insert(id) {
            errors.push(format!("sprint.issues: duplicate issue id '{id}'"));
        }
    }

    if let Some(branch) = &definition.sprint.target_branch {
        if branch.trim().is_empty() || branch.starts_with("weave/") {
            errors.push(format!("sprint.target_branch '{branch}' is not allowed"));
        }
    }

    if let Some(worker) = &definition.worker {
        if worker.command.trim().is_empty() {
            errors.push("worker.command cannot be empty".to_string());
        }
    }

    let root = definition.worktrees.root.to_string_lossy();
    match normalize_repo_path(&root) {
        Ok(normalized) if normalized == ".work" || normalized == ".git" => {
            errors.push(format!("worktrees.root cannot be '{normalized}'"));
        }
        Ok(_) => {}
        Err(e) => errors.push(format!("worktrees.root: {e}")),
    }

    for file in &definition.worktrees.copy_files {
        if let Err(e) = normalize_repo_path(file) {
            errors.push(format!("worktrees.copy_files: {e}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
