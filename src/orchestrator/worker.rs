//! The worker task boundary
//!
//! A worker receives an issue and a worktree path and reports success or
//! failure. The orchestrator never inspects how the change was produced.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::models::IssueDescriptor;

/// How often a running command checks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout for collecting output from child process pipes
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes of stderr kept for the failure reason
const STDERR_TAIL_BYTES: usize = 2048;

/// Input handed to a worker
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub issue: IssueDescriptor,
    pub worktree_path: PathBuf,
    pub branch_name: String,
}

/// What a worker reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Changes are in the worktree; `commit_ref` is set if the worker committed
    Success { commit_ref: Option<String> },
    Failure { reason: String },
}

/// Cooperative cancellation flag shared by its clones.
///
/// Each issue gets its own token, so cancelling the run does not reach a
/// worker until the orchestrator cancels that issue's token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Something that performs the code change for one issue.
///
/// Implementations must confine their writes to `request.worktree_path` and
/// should return promptly once `cancel` is set.
pub trait WorkerTask: Send + Sync {
    fn execute(&self, request: &WorkerRequest, cancel: &CancelToken) -> Result<WorkerOutcome>;
}

/// Runs a shell command inside the worktree
#[derive(Debug, Clone)]
pub struct CommandWorker {
    command: String,
    env: BTreeMap<String, String>,
}

impl CommandWorker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn spawn(&self, request: &WorkerRequest) -> Result<Child> {
        let issue_json =
            serde_json::to_string(&request.issue).context("Failed to serialize issue")?;

        Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&request.worktree_path)
            .envs(&self.env)
            .env("WEAVE_ISSUE_ID", &request.issue.id)
            .env("WEAVE_WORKTREE", &request.worktree_path)
            .env("WEAVE_BRANCH", &request.branch_name)
            .env("WEAVE_PRIORITY", request.issue.priority.to_string())
            .env("WEAVE_ISSUE_JSON", issue_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn worker command: {}", self.command))
    }
}

impl WorkerTask for CommandWorker {
    fn execute(&self, request: &WorkerRequest, cancel: &CancelToken) -> Result<WorkerOutcome> {
        let mut child = self.spawn(request)?;

        // Drain pipes while waiting so a chatty worker cannot block on write
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_or_cancel(&mut child, cancel)? {
            Some(status) => status,
            None => {
                warn!(issue_id = %request.issue.id, "Worker cancelled, killing command");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(WorkerOutcome::Failure {
                    reason: "worker cancelled".to_string(),
                });
            }
        };

        let stdout = stdout.recv_timeout(OUTPUT_COLLECTION_TIMEOUT).unwrap_or_default();
        let stderr = stderr.recv_timeout(OUTPUT_COLLECTION_TIMEOUT).unwrap_or_default();
        debug!(
            issue_id = %request.issue.id,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "Worker command exited"
        );

        if status.success() {
            return Ok(WorkerOutcome::Success { commit_ref: None });
        }

        let code = status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let tail = tail(&stderr, STDERR_TAIL_BYTES);
        let reason = if tail.is_empty() {
            format!("exit status {code}")
        } else {
            format!("exit status {code}: {tail}")
        };
        Ok(WorkerOutcome::Failure { reason })
    }
}

/// Wait for the child, returning `None` if cancelled first
fn wait_or_cancel(child: &mut Child, cancel: &CancelToken) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child
            .wait_timeout(CANCEL_POLL_INTERVAL)
            .context("Failed to wait for worker command")?
        {
            return Ok(Some(status));
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    match stream {
        Some(mut stream) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf);
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}

/// Last `max_bytes` of `text`, trimmed, cut on a char boundary
fn tail(text: &str, max_bytes: usize) -> &str {
    let text = text.trim();
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
