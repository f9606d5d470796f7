//! Shared helpers: temporary repositories and a scripted worker

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use weave::models::{IssueDescriptor, Priority};
use weave::orchestrator::{
    CancelToken, Orchestrator, OrchestratorConfig, WorkerOutcome, WorkerRequest, WorkerTask,
};
use weave::plan::MergeStyle;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Temporary repository on `main` with one commit
pub fn init_test_repo() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let repo_root = temp_dir.path();

    git(repo_root, &["init"]);
    git(repo_root, &["config", "user.email", "test@test.com"]);
    git(repo_root, &["config", "user.name", "Test User"]);
    fs::write(repo_root.join("README.md"), "# Test Repository\n").expect("Failed to write README");
    git(repo_root, &["add", "."]);
    git(repo_root, &["commit", "-m", "Initial commit"]);
    git(repo_root, &["branch", "-M", "main"]);

    temp_dir
}

/// Settings tuned for fast tests
pub fn test_config(repo_root: &Path, max_workers: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        sprint_name: "test-sprint".to_string(),
        repo_root: repo_root.to_path_buf(),
        worktree_root: PathBuf::from(".worktrees"),
        copy_files: Vec::new(),
        target_branch: "main".to_string(),
        max_workers,
        timeout_per_issue: Duration::from_secs(30),
        max_merge_retries: 2,
        merge_style: MergeStyle::FastForward,
        merge_retry_backoff: Duration::from_millis(10),
        p0_sequential: true,
        conflict_threshold: 0.0,
        cancel_grace: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
    }
}

pub fn issue(id: &str, priority: Priority) -> IssueDescriptor {
    IssueDescriptor::new(id, priority)
}

/// What the scripted worker does for one issue
#[derive(Debug, Clone)]
pub enum Action {
    /// Write files into the worktree
    Write(Vec<(String, String)>),
    /// Wait (up to 5s) until `peers` workers are active, then write one file
    WriteTogether { file: (String, String), peers: usize },
    /// Write into the worktree and also into the main checkout
    Leak {
        own: (String, String),
        leaked: (String, String),
    },
    /// Leak while another worker is active, then keep running for `linger`
    LeakAlongside {
        own: (String, String),
        leaked: (String, String),
        linger: Duration,
    },
    /// Leak only after `peer`'s worker has returned, then keep running
    LeakAfterPeer {
        peer: String,
        own: (String, String),
        leaked: (String, String),
        linger: Duration,
    },
    Fail(String),
    /// Block until cancelled or the duration elapses
    Sleep(Duration),
    /// Ignore cancellation, wait `delay`, then write one file
    Delay {
        delay: Duration,
        file: (String, String),
    },
}

/// Worker driven by a per-issue script, recording what it saw
#[derive(Default)]
pub struct ScriptedWorker {
    actions: BTreeMap<String, Action>,
    main_checkout: Option<PathBuf>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            main_checkout: Some(repo_root.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn on(mut self, issue_id: &str, action: Action) -> Self {
        self.actions.insert(issue_id.to_string(), action);
        self
    }

    /// Default action: write `<id>.txt`
    pub fn writes_own_file(self, ids: &[&str]) -> Self {
        ids.iter().fold(self, |worker, id| {
            worker.on(
                id,
                Action::Write(vec![(format!("{id}.txt"), format!("work for {id}\n"))]),
            )
        })
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    fn wait_until(&self, done: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(self) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn leak(
        &self,
        request: &WorkerRequest,
        own: &(String, String),
        leaked: &(String, String),
    ) -> anyhow::Result<()> {
        fs::write(request.worktree_path.join(&own.0), &own.1)?;
        if let Some(main) = &self.main_checkout {
            fs::write(main.join(&leaked.0), &leaked.1)?;
        }
        Ok(())
    }
}

impl WorkerTask for ScriptedWorker {
    fn execute(
        &self,
        request: &WorkerRequest,
        cancel: &CancelToken,
    ) -> anyhow::Result<WorkerOutcome> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(request.issue.id.clone());

        let outcome = match self.actions.get(&request.issue.id) {
            Some(Action::Write(files)) => {
                // Give concurrently launched workers a chance to overlap
                thread::sleep(Duration::from_millis(30));
                for (path, content) in files {
                    fs::write(request.worktree_path.join(path), content)?;
                }
                WorkerOutcome::Success { commit_ref: None }
            }
            Some(Action::WriteTogether { file, peers }) => {
                let deadline = Instant::now() + Duration::from_secs(5);
                while self.active.load(Ordering::SeqCst) < *peers && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(5));
                }
                fs::write(request.worktree_path.join(&file.0), &file.1)?;
                WorkerOutcome::Success { commit_ref: None }
            }
            Some(Action::Leak { own, leaked }) => {
                self.leak(request, own, leaked)?;
                WorkerOutcome::Success { commit_ref: None }
            }
            Some(Action::LeakAlongside { own, leaked, linger }) => {
                self.wait_until(|w| w.active.load(Ordering::SeqCst) >= 2);
                self.leak(request, own, leaked)?;
                thread::sleep(*linger);
                WorkerOutcome::Success { commit_ref: None }
            }
            Some(Action::LeakAfterPeer {
                peer,
                own,
                leaked,
                linger,
            }) => {
                self.wait_until(|w| w.finished.lock().unwrap().contains(peer));
                // Let the peer's executor finish its post-worker snapshot
                thread::sleep(Duration::from_millis(200));
                self.leak(request, own, leaked)?;
                thread::sleep(*linger);
                WorkerOutcome::Success { commit_ref: None }
            }
            Some(Action::Fail(reason)) => WorkerOutcome::Failure {
                reason: reason.clone(),
            },
            Some(Action::Sleep(duration)) => {
                let mut waited = Duration::ZERO;
                while waited < *duration && !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(10));
                    waited += Duration::from_millis(10);
                }
                if cancel.is_cancelled() {
                    WorkerOutcome::Failure {
                        reason: "cancelled".to_string(),
                    }
                } else {
                    WorkerOutcome::Success { commit_ref: None }
                }
            }
            Some(Action::Delay { delay, file }) => {
                thread::sleep(*delay);
                fs::write(request.worktree_path.join(&file.0), &file.1)?;
                WorkerOutcome::Success { commit_ref: None }
            }
            None => WorkerOutcome::Success { commit_ref: None },
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(request.issue.id.clone());
        Ok(outcome)
    }
}

pub fn orchestrator(
    config: OrchestratorConfig,
    issues: Vec<IssueDescriptor>,
    worker: Arc<ScriptedWorker>,
) -> Orchestrator {
    Orchestrator::new(config, issues, worker, CancelToken::new())
        .expect("Failed to create orchestrator")
}

/// Content of `path` at the tip of `main`
pub fn file_on_main(repo_root: &Path, path: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["show", &format!("main:{path}")])
        .current_dir(repo_root)
        .output()
        .expect("Failed to run git show");
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Directories left under the worktree root
pub fn worktree_dirs(repo_root: &Path) -> Vec<String> {
    let root = repo_root.join(".worktrees");
    if !root.is_dir() {
        return Vec::new();
    }
    let mut dirs: Vec<String> = fs::read_dir(&root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    dirs.sort();
    dirs
}

/// Registered worktrees besides the main checkout
pub fn registered_worktree_count(repo_root: &Path) -> usize {
    git(repo_root, &["worktree", "list", "--porcelain"])
        .lines()
        .filter(|line| line.starts_with("worktree "))
        .count()
        - 1
}

/// Assert the run left no worktree behind
pub fn assert_no_worktrees(repo_root: &Path) {
    assert!(
        worktree_dirs(repo_root).is_empty(),
        "worktree directories left: {:?}",
        worktree_dirs(repo_root)
    );
    assert_eq!(registered_worktree_count(repo_root), 0);
}
