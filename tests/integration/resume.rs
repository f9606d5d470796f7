//! Persisted run state, resume and the run lock

use serial_test::serial;
use std::fs;
use std::sync::Arc;

use weave::error::OrchestratorError;
use weave::fs::{RunLock, StateStore, WorkDir};
use weave::models::{Priority, RunState, RunStatus};
use weave::orchestrator::{CancelToken, Orchestrator};

use super::helpers::*;

/// Commit `file` on a fresh `weave/<id>` branch without touching main
fn prepare_issue_branch(repo_root: &std::path::Path, id: &str, file: &str) -> String {
    git(repo_root, &["checkout", "-b", &format!("weave/{id}")]);
    fs::write(repo_root.join(file), format!("resumed {id}\n")).unwrap();
    git(repo_root, &["add", file]);
    git(repo_root, &["commit", "-m", &format!("weave: {id}")]);
    let head = git(repo_root, &["rev-parse", "HEAD"]);
    git(repo_root, &["checkout", "main"]);
    head
}

fn save_state(repo_root: &std::path::Path, state: &RunState) {
    let work_dir = WorkDir::new(repo_root);
    work_dir.ensure().unwrap();
    StateStore::new(work_dir.state_file()).save(state).unwrap();
}

#[test]
#[serial]
fn test_state_is_persisted_and_completed_issues_are_not_rerun() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    let issues = vec![issue("a", Priority::P2), issue("b", Priority::P2)];

    {
        let worker = Arc::new(ScriptedWorker::new(repo_root).writes_own_file(&["a", "b"]));
        let mut orch = orchestrator(test_config(repo_root, 2), issues.clone(), worker);
        orch.run().expect("first run failed");
    }

    let saved = StateStore::new(WorkDir::new(repo_root).state_file())
        .load()
        .unwrap()
        .expect("state should be saved");
    assert!(saved.is_complete());
    assert!(saved.records.values().all(|r| r.worktree.is_none()));

    let main_before = git(repo_root, &["rev-parse", "main"]);
    let worker = Arc::new(ScriptedWorker::new(repo_root).writes_own_file(&["a", "b"]));
    let mut orch = orchestrator(test_config(repo_root, 2), issues, worker.clone());
    let summary = orch.run().expect("second run failed");

    assert!(!summary.has_failures());
    assert!(worker.started_ids().is_empty());
    assert_eq!(git(repo_root, &["rev-parse", "main"]), main_before);
}

#[test]
#[serial]
fn test_awaiting_merge_resumes_without_rerunning_worker() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    let head = prepare_issue_branch(repo_root, "a", "a.txt");

    let mut state = RunState::new("test-sprint", "main", ["a"]);
    {
        let record = state.record_mut("a").unwrap();
        record.status = RunStatus::AwaitingMerge;
        record.worker_output_ref = Some(head);
    }
    save_state(repo_root, &state);

    let worker = Arc::new(ScriptedWorker::new(repo_root));
    let mut orch = orchestrator(
        test_config(repo_root, 1),
        vec![issue("a", Priority::P2)],
        worker.clone(),
    );
    orch.run().expect("run failed");

    assert!(worker.started_ids().is_empty());
    assert_eq!(orch.state().status_of("a"), Some(RunStatus::Completed));
    assert_eq!(file_on_main(repo_root, "a.txt").as_deref(), Some("resumed a\n"));
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_interrupted_merge_of_applied_work_completes_as_no_op() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    let head = prepare_issue_branch(repo_root, "a", "a.txt");
    // The crash happened after the merge landed
    git(repo_root, &["merge", "--ff-only", "weave/a"]);
    let main_before = git(repo_root, &["rev-parse", "main"]);

    let mut state = RunState::new("test-sprint", "main", ["a"]);
    {
        let record = state.record_mut("a").unwrap();
        record.status = RunStatus::Merging;
        record.worker_output_ref = Some(head);
    }
    save_state(repo_root, &state);

    let worker = Arc::new(ScriptedWorker::new(repo_root));
    let mut orch = orchestrator(
        test_config(repo_root, 1),
        vec![issue("a", Priority::P2)],
        worker.clone(),
    );
    orch.run().expect("run failed");

    let record = orch.state().record("a").unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.merge_result.as_ref().unwrap().files_changed.is_empty());
    assert!(worker.started_ids().is_empty());
    assert_eq!(git(repo_root, &["rev-parse", "main"]), main_before);
}

#[test]
#[serial]
fn test_interrupted_running_issue_is_rerun() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let mut state = RunState::new("test-sprint", "main", ["a"]);
    state.record_mut("a").unwrap().status = RunStatus::Running;
    save_state(repo_root, &state);

    let worker = Arc::new(ScriptedWorker::new(repo_root).writes_own_file(&["a"]));
    let mut orch = orchestrator(
        test_config(repo_root, 1),
        vec![issue("a", Priority::P2)],
        worker.clone(),
    );
    assert_eq!(orch.state().status_of("a"), Some(RunStatus::Pending));
    orch.run().expect("run failed");

    assert_eq!(worker.started_ids(), vec!["a"]);
    assert_eq!(orch.state().status_of("a"), Some(RunStatus::Completed));
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_second_run_is_refused_while_lock_is_held() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    let work_dir = WorkDir::new(repo_root);
    work_dir.ensure().unwrap();
    let _held = RunLock::try_acquire(&work_dir.run_lock_file()).unwrap();

    let result = Orchestrator::new(
        test_config(repo_root, 1),
        vec![issue("a", Priority::P2)],
        Arc::new(ScriptedWorker::new(repo_root)),
        CancelToken::new(),
    );

    let err = result.err().expect("lock should be refused");
    assert!(matches!(
        err.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::RunLocked(_))
    ));
    assert!(!repo_root.join(".worktrees").exists());
}
