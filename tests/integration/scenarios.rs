//! End-to-end runs of the core scheduling and merge scenarios

use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use weave::models::{FailureReason, MergeOutcome, Priority, RunStatus};

use super::helpers::*;

#[test]
#[serial]
fn test_disjoint_issues_share_a_wave_and_run_concurrently() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("a", Priority::P2).with_files(["a.rs"]),
        issue("b", Priority::P2).with_files(["b.rs"]),
    ];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root)
            .on(
                "a",
                Action::WriteTogether {
                    file: ("a.rs".into(), "fn a() {}\n".into()),
                    peers: 2,
                },
            )
            .on(
                "b",
                Action::WriteTogether {
                    file: ("b.rs".into(), "fn b() {}\n".into()),
                    peers: 2,
                },
            ),
    );

    let mut orch = orchestrator(test_config(repo_root, 2), issues, Arc::clone(&worker));
    assert_eq!(orch.plan().waves, vec![vec!["a".to_string(), "b".to_string()]]);

    let summary = orch.run().expect("run failed");

    assert!(!summary.has_failures());
    assert_eq!(worker.max_active.load(Ordering::SeqCst), 2);
    assert_eq!(orch.coordinator().max_concurrent_merges(), 1);
    assert_eq!(orch.coordinator().merges_applied(), 2);

    let state = orch.state();
    for id in ["a", "b"] {
        assert_eq!(state.status_of(id), Some(RunStatus::Completed));
    }
    let merge = state.record("a").unwrap().merge_result.as_ref().unwrap();
    assert_eq!(merge.outcome, MergeOutcome::Clean);
    assert_eq!(merge.files_changed, vec!["a.rs".to_string()]);

    assert_eq!(file_on_main(repo_root, "a.rs").as_deref(), Some("fn a() {}\n"));
    assert_eq!(file_on_main(repo_root, "b.rs").as_deref(), Some("fn b() {}\n"));
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_shared_file_serializes_issues_into_separate_waves() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("x", Priority::P1).with_files(["config.py", "x.py"]),
        issue("y", Priority::P1).with_files(["config.py", "y.py"]),
    ];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root)
            .on(
                "x",
                Action::Write(vec![("config.py".into(), "X = 1\n".into())]),
            )
            .on(
                "y",
                Action::Write(vec![("config.py".into(), "X = 1\nY = 2\n".into())]),
            ),
    );

    let mut orch = orchestrator(test_config(repo_root, 4), issues, Arc::clone(&worker));
    assert!(orch.graph().has_edge("y", "x"));
    assert_eq!(
        orch.plan().waves,
        vec![vec!["x".to_string()], vec!["y".to_string()]]
    );

    let summary = orch.run().expect("run failed");

    assert!(!summary.has_failures());
    assert_eq!(worker.started_ids(), vec!["x", "y"]);
    assert_eq!(worker.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(
        file_on_main(repo_root, "config.py").as_deref(),
        Some("X = 1\nY = 2\n")
    );
    assert_eq!(orch.state().record("y").unwrap().wave, Some(1));
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_p0_issue_runs_alone_before_its_layer() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("a", Priority::P1),
        issue("b", Priority::P2),
        issue("hotfix", Priority::P0),
    ];
    let worker = Arc::new(ScriptedWorker::new(repo_root).writes_own_file(&["a", "b", "hotfix"]));

    let mut orch = orchestrator(test_config(repo_root, 4), issues, Arc::clone(&worker));
    assert_eq!(
        orch.plan().waves,
        vec![
            vec!["hotfix".to_string()],
            vec!["a".to_string(), "b".to_string()]
        ]
    );

    orch.run().expect("run failed");

    assert_eq!(worker.started_ids().first().map(String::as_str), Some("hotfix"));
    assert_eq!(orch.state().record("hotfix").unwrap().wave, Some(0));
    assert!(orch.state().is_complete());
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_dependent_issue_builds_on_merged_blocker() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("base", Priority::P2),
        issue("feature", Priority::P2).with_blockers(["base"]),
        issue("polish", Priority::P2).with_blockers(["feature"]),
    ];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root).writes_own_file(&["base", "feature", "polish"]),
    );

    let mut orch = orchestrator(test_config(repo_root, 4), issues, Arc::clone(&worker));
    assert_eq!(orch.plan().len(), 3);

    let summary = orch.run().expect("run failed");

    assert!(!summary.has_failures());
    assert_eq!(worker.started_ids(), vec!["base", "feature", "polish"]);
    for id in ["base", "feature", "polish"] {
        assert!(file_on_main(repo_root, &format!("{id}.txt")).is_some());
    }
    let log = git(repo_root, &["log", "--format=%s", "main"]);
    assert!(log.starts_with("weave: polish"), "unexpected history: {log}");
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_leaked_write_fails_issue_and_leaves_target_untouched() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();
    let main_before = git(repo_root, &["rev-parse", "main"]);

    let issues = vec![issue("z", Priority::P2).with_files(["z.txt"])];
    let worker = Arc::new(ScriptedWorker::new(repo_root).on(
        "z",
        Action::Leak {
            own: ("z.txt".into(), "mine\n".into()),
            leaked: ("leak.txt".into(), "oops\n".into()),
        },
    ));

    let mut orch = orchestrator(test_config(repo_root, 1), issues, worker);
    let summary = orch.run().expect("run failed");

    assert!(summary.has_failures());
    let record = orch.state().record("z").unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(
        record.failure,
        Some(FailureReason::LeakedFiles {
            paths: vec!["leak.txt".to_string()]
        })
    );
    assert_eq!(
        record.merge_result.as_ref().map(|m| m.outcome),
        Some(MergeOutcome::LeakedFiles)
    );

    assert_eq!(git(repo_root, &["rev-parse", "main"]), main_before);
    assert!(file_on_main(repo_root, "z.txt").is_none());
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_leak_is_blamed_on_the_worker_running_when_it_appeared() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("quick", Priority::P2).with_files(["quick.txt"]),
        issue("leaker", Priority::P2).with_files(["leaker.txt"]),
    ];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root)
            .on(
                "quick",
                Action::Delay {
                    delay: Duration::from_millis(300),
                    file: ("quick.txt".into(), "quick\n".into()),
                },
            )
            .on(
                "leaker",
                Action::LeakAfterPeer {
                    peer: "quick".into(),
                    own: ("leaker.txt".into(), "mine\n".into()),
                    leaked: ("stray.txt".into(), "oops\n".into()),
                    linger: Duration::from_millis(300),
                },
            ),
    );

    let mut orch = orchestrator(test_config(repo_root, 2), issues, worker);
    orch.run().expect("run failed");

    assert_eq!(orch.state().status_of("quick"), Some(RunStatus::Completed));
    assert!(file_on_main(repo_root, "quick.txt").is_some());

    let leaker = orch.state().record("leaker").unwrap();
    assert_eq!(leaker.status, RunStatus::Failed);
    assert_eq!(
        leaker.failure,
        Some(FailureReason::LeakedFiles {
            paths: vec!["stray.txt".to_string()]
        })
    );
    assert!(file_on_main(repo_root, "leaker.txt").is_none());
    assert_no_worktrees(repo_root);
}

#[test]
#[serial]
fn test_leak_during_overlapping_workers_fails_both() {
    let temp_dir = init_test_repo();
    let repo_root = temp_dir.path();

    let issues = vec![
        issue("quick", Priority::P2).with_files(["quick.txt"]),
        issue("leaker", Priority::P2).with_files(["leaker.txt"]),
    ];
    let worker = Arc::new(
        ScriptedWorker::new(repo_root)
            .on(
                "quick",
                Action::Delay {
                    delay: Duration::from_millis(300),
                    file: ("quick.txt".into(), "quick\n".into()),
                },
            )
            .on(
                "leaker",
                Action::LeakAlongside {
                    own: ("leaker.txt".into(), "mine\n".into()),
                    leaked: ("stray.txt".into(), "oops\n".into()),
                    linger: Duration::from_millis(800),
                },
            ),
    );

    let mut orch = orchestrator(test_config(repo_root, 2), issues, worker);
    let main_before = git(repo_root, &["rev-parse", "main"]);
    orch.run().expect("run failed");

    for id in ["quick", "leaker"] {
        let record = orch.state().record(id).unwrap();
        assert_eq!(
            record.failure,
            Some(FailureReason::LeakedFiles {
                paths: vec!["stray.txt".to_string()]
            }),
            "{id}"
        );
    }
    assert_eq!(git(repo_root, &["rev-parse", "main"]), main_before);
    assert_no_worktrees(repo_root);
}
