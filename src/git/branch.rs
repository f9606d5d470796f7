//! Branch naming and ref queries for issue branches

use anyhow::{bail, Result};
use std::path::Path;

use super::runner::{run_git, run_git_bool, run_git_checked, run_git_lines};

/// Prefix shared by every issue branch
pub const BRANCH_PREFIX: &str = "weave/";

/// Branch name for an issue: `weave/{issue_id}`
pub fn branch_name_for_issue(issue_id: &str) -> String {
    format!("{BRANCH_PREFIX}{issue_id}")
}

/// Issue id encoded in an issue branch name
pub fn issue_id_from_branch(branch_name: &str) -> Option<&str> {
    branch_name
        .strip_prefix("refs/heads/")
        .unwrap_or(branch_name)
        .strip_prefix(BRANCH_PREFIX)
        .filter(|id| !id.is_empty())
}

pub fn branch_exists(name: &str, repo_root: &Path) -> bool {
    let ref_path = format!("refs/heads/{name}");
    run_git_bool(&["rev-parse", "--verify", "--quiet", &ref_path], repo_root)
}

/// Force-delete a local branch
pub fn delete_branch(name: &str, repo_root: &Path) -> Result<()> {
    run_git_checked(&["branch", "-D", name], repo_root)?;
    Ok(())
}

pub fn current_branch(repo_root: &Path) -> Result<String> {
    run_git_checked(&["rev-parse", "--abbrev-ref", "HEAD"], repo_root)
}

/// Resolve any revision to a full commit SHA
pub fn rev_parse(rev: &str, dir: &Path) -> Result<String> {
    let spec = format!("{rev}^{{commit}}");
    run_git_checked(&["rev-parse", "--verify", &spec], dir)
}

/// Whether `ancestor` is reachable from (or equal to) `descendant`
pub fn is_ancestor(ancestor: &str, descendant: &str, repo_root: &Path) -> Result<bool> {
    let output = run_git(
        &["merge-base", "--is-ancestor", ancestor, descendant],
        repo_root,
    )?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "git merge-base --is-ancestor {ancestor} {descendant} failed: {}",
                stderr.trim()
            )
        }
    }
}

/// The repository's default branch: origin's HEAD, else `main`, else `master`
pub fn default_branch(repo_root: &Path) -> Result<String> {
    if let Ok(output) = run_git(&["symbolic-ref", "refs/remotes/origin/HEAD"], repo_root) {
        if output.status.success() {
            let result = String::from_utf8_lossy(&output.stdout);
            if let Some(branch) = result.trim().strip_prefix("refs/remotes/origin/") {
                return Ok(branch.to_string());
            }
        }
    }

    for candidate in ["main", "master"] {
        if branch_exists(candidate, repo_root) {
            return Ok(candidate.to_string());
        }
    }

    bail!("Could not determine default branch; set sprint.target_branch")
}

/// Every local `weave/*` branch
pub fn list_issue_branches(repo_root: &Path) -> Result<Vec<String>> {
    let pattern = format!("{BRANCH_PREFIX}*");
    let branches = run_git_lines(
        &[
            "for-each-ref",
            "--format=%(refname:short)",
            &format!("refs/heads/{pattern}"),
        ],
        repo_root,
    )?;
    Ok(branches)
}
