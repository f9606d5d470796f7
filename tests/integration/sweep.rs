//! Orphaned worktree sweep

use serial_test::serial;
use std::path::Path;

use weave::commands::sweep::sweep;
use weave::fs::{RunLock, StateStore, WorkDir};
use weave::models::{RunState, RunStatus};

use super::helpers::*;

fn add_orphan(repo_root: &Path, id: &str) {
    git(
        repo_root,
        &[
            "worktree",
            "add",
            "-b",
            &format!("weave/{id}"),
            &format!(".worktrees/{id}"),
            "main",
        ],
    );
}

fn branch_exists(repo_root: &Path, id: &str) -> bool {
    !git(repo_root, &["branch", "--list", &format!("weave/{id}")]).is_empty()
}

#[test]
#[serial]
fn test_sweep_removes_orphans_without_run_state() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    add_orphan(repo_root, "orphan");

    let report = sweep(repo_root, Path::new(".worktrees"), false).expect("sweep failed");

    assert_eq!(report.removed, vec!["orphan".to_string()]);
    assert!(report.skipped.is_empty());
    assert!(!branch_exists(repo_root, "orphan"));
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_sweep_keeps_unfinished_issues_unless_forced() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    add_orphan(repo_root, "live");
    add_orphan(repo_root, "done");

    let mut state = RunState::new("sprint", "main", ["live", "done"]);
    state.record_mut("live").unwrap().status = RunStatus::AwaitingMerge;
    state.record_mut("done").unwrap().status = RunStatus::Completed;
    let work_dir = WorkDir::new(repo_root);
    work_dir.ensure().unwrap();
    StateStore::new(work_dir.state_file()).save(&state).unwrap();

    let report = sweep(repo_root, Path::new(".worktrees"), false).expect("sweep failed");
    assert_eq!(report.removed, vec!["done".to_string()]);
    assert_eq!(report.skipped, vec!["live".to_string()]);
    assert_eq!(worktree_dirs(repo_root), vec!["live".to_string()]);

    let report = sweep(repo_root, Path::new(".worktrees"), true).expect("forced sweep failed");
    assert_eq!(report.removed, vec!["live".to_string()]);
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_sweep_refused_during_a_run() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    add_orphan(repo_root, "orphan");

    let work_dir = WorkDir::new(repo_root);
    work_dir.ensure().unwrap();
    let _held = RunLock::try_acquire(&work_dir.run_lock_file()).unwrap();

    assert!(sweep(repo_root, Path::new(".worktrees"), false).is_err());
    assert_eq!(worktree_dirs(repo_root), vec!["orphan".to_string()]);
}
