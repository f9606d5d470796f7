//! Working-tree status queries

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::path::Path;

use super::runner::{run_git, run_git_bool, run_git_checked};

/// Every path with staged, unstaged, or untracked changes.
///
/// Untracked directories are expanded to individual files. Paths are
/// repository-relative with forward slashes.
pub fn dirty_paths(dir: &Path) -> Result<BTreeSet<String>> {
    status_paths(dir, false)
}

/// [`dirty_paths`] plus every ignored file, so writes to `.env` or build
/// output directories are visible too.
pub fn checkout_paths(dir: &Path) -> Result<BTreeSet<String>> {
    status_paths(dir, true)
}

fn status_paths(dir: &Path, include_ignored: bool) -> Result<BTreeSet<String>> {
    // No optional locks: this runs while merges hold the main index
    let mut args = vec![
        "--no-optional-locks",
        "status",
        "--porcelain=v1",
        "-z",
        "--untracked-files=all",
    ];
    if include_ignored {
        args.push("--ignored=traditional");
    }
    let output = run_git(&args, dir)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git status failed: {}", stderr.trim());
    }
    Ok(parse_porcelain_z(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `git status --porcelain=v1 -z`.
///
/// Entries are `XY <path>` separated by NUL; renames and copies carry the
/// original path as an extra NUL-separated field, which is reported too.
pub fn parse_porcelain_z(output: &str) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    let mut fields = output.split('\0').filter(|f| !f.is_empty());

    while let Some(entry) = fields.next() {
        if entry.len() < 4 {
            continue;
        }
        let (code, path) = entry.split_at(3);
        paths.insert(path.to_string());

        let x = code.as_bytes()[0];
        if x == b'R' || x == b'C' {
            if let Some(original) = fields.next() {
                paths.insert(original.to_string());
            }
        }
    }

    paths
}

/// Stage and commit every change in `dir`, leaving `excluded` paths out.
///
/// Returns `true` when a commit was created.
pub fn commit_all(dir: &Path, message: &str, excluded: &[String]) -> Result<bool> {
    let exclude_specs: Vec<String> = excluded.iter().map(|p| format!(":(exclude){p}")).collect();
    let mut args = vec!["add", "--all", "--", "."];
    args.extend(exclude_specs.iter().map(String::as_str));
    run_git_checked(&args, dir)?;

    if run_git_bool(&["diff", "--cached", "--quiet"], dir) {
        return Ok(false);
    }

    run_git_checked(&["commit", "--no-verify", "-m", message], dir)?;
    Ok(true)
}
