//! Worker failures, timeouts, merge conflicts and abandonment

use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

use weave::error::OrchestratorError;
use weave::models::{FailureReason, Priority, RunStatus};
use weave::orchestrator::{CancelToken, Orchestrator};

use super::helpers::*;

#[test]
#[serial]
fn test_blocked_issue_is_abandoned_when_blocker_fails() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("y", Priority::P2),
        issue("x", Priority::P2).with_blockers(["y"]),
    ];
    let worker = Arc::new(ScriptedWorker::new(repo_root).on("y", Action::Fail("boom".into())));

    let mut orch = orchestrator(test_config(repo_root, 2), issues, Arc::clone(&worker));
    let summary = orch.run().expect("run failed");

    assert!(summary.has_failures());
    let state = orch.state();
    assert_eq!(state.status_of("y"), Some(RunStatus::Failed));
    assert_eq!(
        state.record("y").unwrap().failure,
        Some(FailureReason::WorkerFailure {
            reason: "boom".to_string()
        })
    );
    assert_eq!(state.status_of("x"), Some(RunStatus::Abandoned));
    assert_eq!(
        state.record("x").unwrap().failure,
        Some(FailureReason::DependencyFailed {
            dependency: "y".to_string()
        })
    );
    assert_eq!(worker.started_ids(), vec!["y"]);
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_abandonment_is_transitive_and_spares_independent_issues() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("root", Priority::P2),
        issue("mid", Priority::P2).with_blockers(["root"]),
        issue("leaf", Priority::P2).with_blockers(["mid"]),
        issue("free", Priority::P2),
    ];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root)
            .on("root", Action::Fail("broken build".into()))
            .writes_own_file(&["free"]),
    );

    let mut orch = orchestrator(test_config(repo_root, 2), issues, worker);
    let summary = orch.run().expect("run failed");

    let state = orch.state();
    assert_eq!(state.status_of("free"), Some(RunStatus::Completed));
    assert_eq!(state.status_of("mid"), Some(RunStatus::Abandoned));
    assert_eq!(state.status_of("leaf"), Some(RunStatus::Abandoned));
    assert_eq!(
        state.record("leaf").unwrap().failure,
        Some(FailureReason::DependencyFailed {
            dependency: "root".to_string()
        })
    );
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.counts.abandoned, 2);
    assert!(file_on_main(repo_root, "free.txt").is_some());
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_worker_exceeding_timeout_fails_with_timeout() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![issue("slow", Priority::P2)];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root).on("slow", Action::Sleep(Duration::from_secs(30))),
    );
    let mut config = test_config(repo_root, 1);
    config.timeout_per_issue = Duration::from_secs(1);

    let mut orch = orchestrator(config, issues, worker);
    orch.run().expect("run failed");

    assert_eq!(
        orch.state().record("slow").unwrap().failure,
        Some(FailureReason::WorkerTimeout { timeout_secs: 1 })
    );
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_persistent_conflict_stops_after_configured_retries() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    // No declared files, so nothing serializes them
    let issues = vec![issue("p", Priority::P2), issue("q", Priority::P2)];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root)
            .on(
                "p",
                Action::WriteTogether {
                    file: ("shared.txt".into(), "from p\n".into()),
                    peers: 2,
                },
            )
            .on(
                "q",
                Action::WriteTogether {
                    file: ("shared.txt".into(), "from q\n".into()),
                    peers: 2,
                },
            ),
    );
    let mut config = test_config(repo_root, 2);
    config.max_merge_retries = 1;

    let mut orch = orchestrator(config, issues, worker);
    orch.run().expect("run failed");

    let state = orch.state();
    let (winner, loser) = if state.status_of("p") == Some(RunStatus::Completed) {
        ("p", "q")
    } else {
        ("q", "p")
    };
    assert_eq!(state.status_of(winner), Some(RunStatus::Completed));
    assert_eq!(state.status_of(loser), Some(RunStatus::Failed));

    let record = state.record(loser).unwrap();
    assert_eq!(
        record.failure,
        Some(FailureReason::MergeConflict {
            conflict_files: vec!["shared.txt".to_string()],
            attempts: 2,
        })
    );
    assert_eq!(record.merge_result.as_ref().unwrap().retry_count, 1);
    assert_eq!(
        file_on_main(repo_root, "shared.txt"),
        Some(format!("from {winner}\n"))
    );
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_cycle_aborts_before_any_worktree_exists() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("a", Priority::P2).with_blockers(["b"]),
        issue("b", Priority::P2).with_blockers(["a"]),
        issue("c", Priority::P2),
    ];
    let worker = Arc::new(ScriptedWorker::new(repo_root));

    let err = Orchestrator::new(
        test_config(repo_root, 2),
        issues,
        worker.clone(),
        CancelToken::new(),
    )
    .err()
    .expect("cycle should be rejected");

    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::CycleDetected { issues }) => {
            assert_eq!(issues, &vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }
    assert!(worker.started_ids().is_empty());
    assert!(!repo_root.join(".worktrees").exists());
    assert!(!repo_root.join(".work").exists());
}
