//! Worktree registry operations: add, attach, remove, list, prune

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::git::runner::{run_git, run_git_checked};

use super::parser::{parse_worktree_list, WorktreeInfo};

/// Create a worktree at `path` on a new branch started from `base`.
///
/// Runs `git worktree add -b <branch> <path> <base>`. Fails if the path
/// already exists; a stale branch of the same name is replaced so the
/// new branch always starts from `base`.
pub fn add_worktree(repo_root: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
    if path.exists() {
        bail!("Worktree path already exists: {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let path_str = path.to_string_lossy();
    let args = ["worktree", "add", "-b", branch, path_str.as_ref(), base];
    let output = run_git(&args, repo_root)?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.contains("already exists") {
        bail!("git worktree add failed: {}", stderr.trim());
    }

    run_git_checked(&["branch", "-D", branch], repo_root)
        .with_context(|| format!("Failed to delete stale branch {branch}"))?;
    run_git_checked(&args, repo_root).context("git worktree add failed after replacing branch")?;
    Ok(())
}

/// Create a worktree at `path` that checks out an existing branch
pub fn attach_worktree(repo_root: &Path, path: &Path, branch: &str) -> Result<()> {
    if path.exists() {
        bail!("Worktree path already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let path_str = path.to_string_lossy();
    run_git_checked(&["worktree", "add", path_str.as_ref(), branch], repo_root)?;
    Ok(())
}

/// Remove a worktree, falling back to deleting the directory by hand.
///
/// Returns `false` when there was nothing to remove.
pub fn remove_worktree(repo_root: &Path, path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    let path_str = path.to_string_lossy();
    if let Err(git_err) = run_git_checked(
        &["worktree", "remove", "--force", path_str.as_ref()],
        repo_root,
    ) {
        std::fs::remove_dir_all(path).with_context(|| {
            format!(
                "Failed to remove worktree at {} after git error: {git_err}",
                path.display()
            )
        })?;
    }
    Ok(true)
}

pub fn list_worktrees(repo_root: &Path) -> Result<Vec<WorktreeInfo>> {
    let stdout = run_git_checked(&["worktree", "list", "--porcelain"], repo_root)?;
    Ok(parse_worktree_list(&stdout))
}

/// Drop registry entries whose directories no longer exist
pub fn prune_worktrees(repo_root: &Path) -> Result<()> {
    run_git_checked(&["worktree", "prune"], repo_root)?;
    Ok(())
}

/// Whether `path` is registered in the repository's worktree list
pub fn is_registered_worktree(repo_root: &Path, path: &Path) -> Result<bool> {
    let wanted = canonical(path);
    Ok(list_worktrees(repo_root)?
        .iter()
        .any(|wt| canonical(&wt.path) == wanted))
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
