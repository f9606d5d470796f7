//! Rebase and integrate issue branches into the target branch

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::plan::MergeStyle;

use super::branch::{current_branch, rev_parse};
use super::runner::{run_git, run_git_checked, run_git_lines};

/// Result of replaying an issue branch onto the target tip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    Clean,
    /// Rebase stopped on conflicts and was aborted
    Conflict(Vec<String>),
}

/// Rebase the branch checked out in `worktree` onto `onto`.
///
/// On conflict the rebase is aborted, leaving the branch as it was.
pub fn rebase_onto(worktree: &Path, onto: &str) -> Result<RebaseOutcome> {
    let output = run_git(&["rebase", onto], worktree)?;
    if output.status.success() {
        return Ok(RebaseOutcome::Clean);
    }

    let conflicts = conflicting_files(worktree).unwrap_or_default();
    let abort = run_git_checked(&["rebase", "--abort"], worktree);

    if !conflicts.is_empty() {
        abort.context("Failed to abort conflicted rebase")?;
        return Ok(RebaseOutcome::Conflict(conflicts));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    bail!("git rebase {onto} failed: {}", stderr.trim())
}

/// Files left unmerged by an interrupted rebase or merge
pub fn conflicting_files(dir: &Path) -> Result<Vec<String>> {
    run_git_lines(&["diff", "--name-only", "--diff-filter=U"], dir)
}

/// Land `branch` on `target` in the main checkout and return the new tip.
///
/// The branch must already be rebased onto the target tip, so a
/// fast-forward always applies.
pub fn integrate_branch(
    repo_root: &Path,
    branch: &str,
    target: &str,
    style: MergeStyle,
) -> Result<String> {
    if current_branch(repo_root)? != target {
        run_git_checked(&["checkout", target], repo_root)
            .with_context(|| format!("Failed to check out {target}"))?;
    }

    match style {
        MergeStyle::FastForward => {
            run_git_checked(&["merge", "--ff-only", branch], repo_root)?;
        }
        MergeStyle::MergeCommit => {
            let message = format!("Merge {branch} into {target}");
            run_git_checked(&["merge", "--no-ff", "-m", &message, branch], repo_root)?;
        }
    }

    rev_parse(target, repo_root)
}

/// Paths that differ between two revisions
pub fn changed_files(dir: &Path, from: &str, to: &str) -> Result<Vec<String>> {
    run_git_lines(&["diff", "--name-only", from, to], dir)
}

/// Whether a git failure came from a contended `index.lock`
pub fn mentions_index_lock(err: &anyhow::Error) -> bool {
    format!("{err:#}").contains("index.lock")
}
