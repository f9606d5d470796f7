//! `weave sweep`: remove worktrees left behind by crashed runs

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::fs::{RunLock, StateStore, WorkDir};
use crate::git::{
    delete_branch, issue_id_from_branch, list_issue_branches, list_worktrees, prune_worktrees,
};
use crate::orchestrator::WorktreeManager;
use crate::plan::WorktreeSettings;

use super::common::current_repo_root;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<String>,
    /// Worktrees whose issue is still resumable
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Issue branches deleted without a worktree
    pub branches: Vec<String>,
}

pub fn execute(force: bool, root: Option<PathBuf>) -> Result<()> {
    let repo_root = current_repo_root()?;
    let root = root.unwrap_or_else(|| WorktreeSettings::default().root);
    let report = sweep(&repo_root, &root, force)?;

    for id in &report.removed {
        println!("  {} {id}", "removed".green());
    }
    for id in &report.skipped {
        println!(
            "  {} {id} {}",
            "kept".yellow(),
            "(issue not finished; use --force)".dimmed()
        );
    }
    for branch in &report.branches {
        println!("  {} branch {branch}", "deleted".green());
    }
    for (id, error) in &report.failed {
        println!("  {} {id}: {error}", "failed".red());
    }
    if report.removed.is_empty()
        && report.skipped.is_empty()
        && report.failed.is_empty()
        && report.branches.is_empty()
    {
        println!("{}", "No orphaned worktrees.".dimmed());
    }
    Ok(())
}

/// Release every worktree under `worktree_root` whose issue is terminal or
/// unknown to the saved run state. Unfinished issues are kept unless `force`.
///
/// Refuses to run while another process holds the run lock.
pub fn sweep(repo_root: &Path, worktree_root: &Path, force: bool) -> Result<SweepReport> {
    let work_dir = WorkDir::new(repo_root);
    work_dir.ensure()?;
    let _lock = RunLock::try_acquire(&work_dir.run_lock_file())?;

    let state = StateStore::new(work_dir.state_file()).load()?;
    let manager = WorktreeManager::new(repo_root, worktree_root, Vec::new());

    let mut candidates: BTreeSet<String> = manager.directories_on_disk()?.into_iter().collect();
    candidates.extend(registered_under(repo_root, manager.root())?);

    let unfinished = |issue_id: &str| {
        state
            .as_ref()
            .and_then(|s| s.record(issue_id))
            .is_some_and(|r| !r.status.is_terminal())
    };

    let mut report = SweepReport::default();
    for issue_id in &candidates {
        let issue_id = issue_id.clone();
        if unfinished(&issue_id) && !force {
            report.skipped.push(issue_id);
            continue;
        }

        match manager.remove_directory(&issue_id, true) {
            Ok(()) => {
                info!(issue_id = %issue_id, "Swept worktree");
                report.removed.push(issue_id);
            }
            Err(e) => {
                warn!(issue_id = %issue_id, error = %format!("{e:#}"), "Sweep failed");
                report.failed.push((issue_id, format!("{e:#}")));
            }
        }
    }

    prune_worktrees(repo_root)?;

    // Branches whose worktree is already gone
    for branch in list_issue_branches(repo_root)? {
        let Some(issue_id) = issue_id_from_branch(&branch) else {
            continue;
        };
        if candidates.contains(issue_id) || (unfinished(issue_id) && !force) {
            continue;
        }
        match delete_branch(&branch, repo_root) {
            Ok(()) => report.branches.push(branch),
            Err(e) => report.failed.push((branch, format!("{e:#}"))),
        }
    }

    Ok(report)
}

/// Issue ids of registered worktrees living under `root`
fn registered_under(repo_root: &Path, root: &Path) -> Result<Vec<String>> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    Ok(list_worktrees(repo_root)?
        .into_iter()
        .filter(|wt| wt.path.starts_with(&root))
        .filter_map(|wt| {
            wt.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .collect())
}
