//! Per-issue thread: run the worker under a timeout, then merge
//!
//! The thread never touches RunState. Everything it learns is sent to the
//! control loop as an [`IssueEvent`].

use std::collections::BTreeSet;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::OrchestratorError;
use crate::git::{commit_all, rev_parse};
use crate::models::{FailureReason, IssueDescriptor, MergeOutcome, MergeResult, WorktreeHandle};
use crate::orchestrator::merge_coordinator::{
    LeakWindow, MergeCoordinator, MergeProgress, MergeRequest,
};
use crate::orchestrator::worker::{CancelToken, WorkerOutcome, WorkerRequest, WorkerTask};

use super::events::{IssueEvent, IssueOutcome};

/// How long a timed-out worker gets to exit after being cancelled
const KILL_WAIT: Duration = Duration::from_secs(10);

/// Whether the worker runs or a previous run's output goes straight to merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaunchMode {
    Full,
    MergeOnly,
}

pub(crate) struct IssueContext {
    pub issue: IssueDescriptor,
    pub handle: WorktreeHandle,
    pub mode: LaunchMode,
    pub worker: Arc<dyn WorkerTask>,
    pub coordinator: Arc<MergeCoordinator>,
    pub token: CancelToken,
    pub timeout: Duration,
    /// Copied ancillary files, never committed
    pub commit_exclusions: Vec<String>,
    pub events: Sender<IssueEvent>,
}

pub(crate) fn spawn_issue(ctx: IssueContext) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("weave-{}", ctx.issue.id))
        .spawn(move || run_issue(ctx))
}

fn run_issue(ctx: IssueContext) {
    let issue_id = ctx.issue.id.clone();

    let mut leak_window = None;
    if ctx.mode == LaunchMode::Full {
        match execute_worker(&ctx) {
            Ok((output_ref, window)) => {
                leak_window = Some(window);
                info!(issue_id = %issue_id, output_ref = %output_ref, "Worker succeeded");
                send(
                    &ctx.events,
                    IssueEvent::WorkerSucceeded {
                        issue_id: issue_id.clone(),
                        output_ref,
                    },
                );
            }
            Err(reason) => {
                send(
                    &ctx.events,
                    IssueEvent::Finished {
                        issue_id,
                        outcome: IssueOutcome::Failed {
                            reason,
                            merge_result: None,
                        },
                    },
                );
                return;
            }
        }
    }

    let outcome = merge(&ctx, leak_window);
    send(&ctx.events, IssueEvent::Finished { issue_id, outcome });
}

/// Run the worker on its own thread and wait at most `ctx.timeout`.
///
/// The main checkout is snapshotted right before the worker starts and
/// right after it returns; the pair bounds what this issue can be blamed for.
fn execute_worker(ctx: &IssueContext) -> Result<(String, LeakWindow), FailureReason> {
    let before = snapshot(ctx)?;
    let request = WorkerRequest {
        issue: ctx.issue.clone(),
        worktree_path: ctx.handle.path.clone(),
        branch_name: ctx.handle.branch_name.clone(),
    };

    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(&ctx.worker);
    let token = ctx.token.clone();
    let spawned = thread::Builder::new()
        .name(format!("weave-worker-{}", ctx.issue.id))
        .spawn(move || {
            let _ = tx.send(worker.execute(&request, &token));
        });
    if let Err(e) = spawned {
        return Err(FailureReason::WorkerFailure {
            reason: format!("failed to start worker thread: {e}"),
        });
    }

    let outcome = match rx.recv_timeout(ctx.timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                issue_id = %ctx.issue.id,
                timeout_secs = ctx.timeout.as_secs(),
                "Worker timed out"
            );
            ctx.token.cancel();
            let _ = rx.recv_timeout(KILL_WAIT);
            return Err(FailureReason::WorkerTimeout {
                timeout_secs: ctx.timeout.as_secs(),
            });
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(FailureReason::WorkerFailure {
                reason: "worker exited without reporting a result".to_string(),
            });
        }
    };

    if ctx.token.is_cancelled() {
        return Err(FailureReason::Cancelled);
    }

    match outcome {
        Ok(WorkerOutcome::Success { commit_ref }) => {
            debug!(issue_id = %ctx.issue.id, ?commit_ref, "Collecting worker output");
            let after = snapshot(ctx)?;
            let output_ref = collect_output(ctx).map_err(|e| FailureReason::WorkerFailure {
                reason: format!("failed to commit worker output: {e:#}"),
            })?;
            Ok((output_ref, LeakWindow::new(before, after)))
        }
        Ok(WorkerOutcome::Failure { reason }) => Err(FailureReason::WorkerFailure { reason }),
        Err(e) => Err(FailureReason::WorkerFailure {
            reason: format!("{e:#}"),
        }),
    }
}

fn snapshot(ctx: &IssueContext) -> Result<BTreeSet<String>, FailureReason> {
    ctx.coordinator
        .leak_snapshot()
        .map_err(|e| FailureReason::WorkerFailure {
            reason: format!("{e:#}"),
        })
}

/// Commit anything the worker left uncommitted and return the branch head
fn collect_output(ctx: &IssueContext) -> anyhow::Result<String> {
    let message = format!("weave: {}", ctx.issue.id);
    commit_all(&ctx.handle.path, &message, &ctx.commit_exclusions)?;
    rev_parse("HEAD", &ctx.handle.path)
}

fn merge(ctx: &IssueContext, leak_window: Option<LeakWindow>) -> IssueOutcome {
    let request = MergeRequest {
        issue_id: ctx.issue.id.clone(),
        worktree_path: ctx.handle.path.clone(),
        branch_name: ctx.handle.branch_name.clone(),
        leak_window,
    };

    let events = ctx.events.clone();
    let issue_id = ctx.issue.id.clone();
    let observer = move |progress: MergeProgress| {
        let event = match progress {
            MergeProgress::Started { attempt } => IssueEvent::MergeStarted {
                issue_id: issue_id.clone(),
                attempt,
            },
            MergeProgress::Retrying {
                attempt,
                conflict_files,
            } => IssueEvent::MergeRetry {
                issue_id: issue_id.clone(),
                attempt,
                conflict_files,
            },
        };
        send(&events, event);
    };

    match ctx.coordinator.merge(&request, &observer) {
        Ok(result) => outcome_for(result),
        Err(err) => {
            let reason = match err.downcast_ref::<OrchestratorError>() {
                Some(OrchestratorError::IndexLockCollision { message, .. }) => {
                    FailureReason::IndexLockCollision {
                        message: message.clone(),
                    }
                }
                _ => FailureReason::MergeError {
                    message: format!("{err:#}"),
                },
            };
            IssueOutcome::Failed {
                reason,
                merge_result: None,
            }
        }
    }
}

fn outcome_for(result: MergeResult) -> IssueOutcome {
    let reason = match result.outcome {
        MergeOutcome::Clean => return IssueOutcome::Merged(result),
        MergeOutcome::Conflict => FailureReason::MergeConflict {
            conflict_files: result.conflict_files.clone(),
            attempts: result.retry_count + 1,
        },
        MergeOutcome::LeakedFiles => FailureReason::LeakedFiles {
            paths: result.leaked_files.clone(),
        },
        MergeOutcome::Aborted => FailureReason::Cancelled,
    };
    IssueOutcome::Failed {
        reason,
        merge_result: Some(result),
    }
}

fn send(events: &Sender<IssueEvent>, event: IssueEvent) {
    if events.send(event).is_err() {
        debug!("Control loop no longer listening; dropping issue event");
    }
}
