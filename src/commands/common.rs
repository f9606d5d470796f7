//! Loading a sprint and everything it points at

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::git::{check_git_available, default_branch, repo_toplevel};
use crate::models::IssueDescriptor;
use crate::orchestrator::OrchestratorConfig;
use crate::plan::{load_issues, SprintDefinition};

/// A validated sprint with its issues and repository
pub struct SprintContext {
    pub definition: SprintDefinition,
    pub repo_root: PathBuf,
    pub target_branch: String,
    pub issues: Vec<IssueDescriptor>,
}

impl SprintContext {
    /// Read the sprint file, locate its repository and load the selected issues
    pub fn load(sprint_path: &Path) -> Result<Self> {
        let definition = SprintDefinition::load(sprint_path)?;

        let sprint_dir = match sprint_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        check_git_available(&sprint_dir)?;
        let repo_root = repo_toplevel(&sprint_dir)?;

        let target_branch = match &definition.sprint.target_branch {
            Some(branch) => branch.clone(),
            None => default_branch(&repo_root)?,
        };

        let issues_dir = resolve(&repo_root, &definition.sprint.issues_dir);
        let issues = load_issues(&issues_dir, &definition.sprint.issues)
            .with_context(|| format!("Failed to load issues for sprint '{}'", definition.sprint.name))?;

        Ok(Self {
            definition,
            repo_root,
            target_branch,
            issues,
        })
    }

    pub fn orchestrator_config(&self, max_workers: Option<usize>) -> OrchestratorConfig {
        let config =
            OrchestratorConfig::from_sprint(&self.definition, &self.repo_root, &self.target_branch);
        match max_workers {
            Some(n) => config.with_max_workers(n),
            None => config,
        }
    }
}

/// Repository containing the current directory
pub fn current_repo_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    repo_toplevel(&cwd)
}

fn resolve(repo_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
    }
}
