//! Cooperative cancellation of a run

use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use weave::models::{FailureReason, Priority, RunStatus};
use weave::orchestrator::{CancelToken, Orchestrator};

use super::helpers::*;

#[test]
#[serial]
fn test_cancel_mid_wave_fails_in_flight_and_cleans_up() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("long", Priority::P2),
        issue("after", Priority::P2).with_blockers(["long"]),
    ];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root).on("long", Action::Sleep(Duration::from_secs(30))),
    );
    let mut config = test_config(repo_root, 2);
    config.cancel_grace = Duration::from_millis(200);

    let cancel = CancelToken::new();
    let mut orch = Orchestrator::new(config, issues, worker.clone(), cancel.clone())
        .expect("Failed to create orchestrator");

    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        trigger.cancel();
    });

    let summary = orch.run().expect("run failed");
    canceller.join().unwrap();

    assert!(summary.cancelled);
    assert_eq!(
        orch.state().record("long").unwrap().failure,
        Some(FailureReason::Cancelled)
    );
    assert_eq!(orch.state().status_of("after"), Some(RunStatus::Abandoned));
    assert_eq!(worker.started_ids(), vec!["long"]);
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_cancel_before_start_launches_nothing() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![issue("a", Priority::P2), issue("b", Priority::P2)];
    let worker = Arc::new(ScriptedWorker::new(repo_root).writes_own_file(&["a", "b"]));

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut orch = Orchestrator::new(test_config(repo_root, 2), issues, worker.clone(), cancel)
        .expect("Failed to create orchestrator");

    let summary = orch.run().expect("run failed");

    assert!(summary.cancelled);
    assert!(!summary.has_failures());
    assert!(worker.started_ids().is_empty());
    assert_eq!(orch.state().status_of("a"), Some(RunStatus::Pending));
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_worker_finishing_within_grace_still_merges() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("slow", Priority::P2),
        issue("next", Priority::P2).with_blockers(["slow"]),
    ];
    let worker = Arc::new(ScriptedWorker::new(repo_root).on(
        "slow",
        Action::Delay {
            delay: Duration::from_millis(300),
            file: ("slow.txt".into(), "done\n".into()),
        },
    ));
    let mut config = test_config(repo_root, 1);
    config.cancel_grace = Duration::from_secs(5);

    let cancel = CancelToken::new();
    let mut orch = Orchestrator::new(config, issues, worker.clone(), cancel.clone())
        .expect("Failed to create orchestrator");

    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    let summary = orch.run().expect("run failed");
    canceller.join().unwrap();

    assert!(summary.cancelled);
    let slow = orch.state().record("slow").unwrap();
    assert_eq!(slow.status, RunStatus::Completed);
    assert_eq!(slow.failure, None);
    assert_eq!(file_on_main(repo_root, "slow.txt").as_deref(), Some("done\n"));
    assert_eq!(orch.state().status_of("next"), Some(RunStatus::Pending));
    assert_eq!(worker.started_ids(), vec!["slow"]);
    assert_no_worktrees(repo_root);
}
