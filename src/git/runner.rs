//! Thin wrappers around `git` invocations
//!
//! Every git call in the crate goes through these helpers so failures carry
//! the command and stderr in their context.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Output};

/// Run a git command in `dir` and return the raw output.
///
/// Use this when the caller needs to inspect stderr or interpret a
/// non-zero exit itself (conflicts, ancestry checks).
pub fn run_git(args: &[&str], dir: &Path) -> Result<Output> {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("Failed to execute: git {}", args.join(" ")))
}

/// Run a git command, bail on non-zero exit, return trimmed stdout
pub fn run_git_checked(args: &[&str], dir: &Path) -> Result<String> {
    let output = run_git(args, dir)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a git command and report only whether it exited 0.
///
/// Spawn failures count as `false`.
pub fn run_git_bool(args: &[&str], dir: &Path) -> bool {
    run_git(args, dir)
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run a git command and split stdout into non-empty lines
pub fn run_git_lines(args: &[&str], dir: &Path) -> Result<Vec<String>> {
    let stdout = run_git_checked(args, dir)?;
    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Fail early when git is missing or too old for worktrees
pub fn check_git_available(dir: &Path) -> Result<()> {
    run_git_checked(&["--version"], dir).context("Git is not installed or not in PATH")?;
    if !run_git_bool(&["worktree", "list"], dir) {
        bail!("Git worktree support is unavailable (requires git 2.15+ inside a repository)");
    }
    Ok(())
}

/// Resolve the top level of the repository containing `dir`
pub fn repo_toplevel(dir: &Path) -> Result<std::path::PathBuf> {
    let top = run_git_checked(&["rev-parse", "--show-toplevel"], dir)
        .with_context(|| format!("{} is not inside a git repository", dir.display()))?;
    Ok(std::path::PathBuf::from(top))
}
