//! Messages from issue threads to the control loop

use crate::models::{FailureReason, MergeResult};

/// Reported by an issue thread; the control loop applies it to RunState
#[derive(Debug, Clone)]
pub(crate) enum IssueEvent {
    /// Worker finished and its changes are committed at `output_ref`
    WorkerSucceeded { issue_id: String, output_ref: String },
    /// The merge lock is held for attempt `attempt`
    MergeStarted { issue_id: String, attempt: u32 },
    /// Attempt conflicted; waiting to try again
    MergeRetry {
        issue_id: String,
        attempt: u32,
        conflict_files: Vec<String>,
    },
    /// The issue thread is done
    Finished { issue_id: String, outcome: IssueOutcome },
}

#[derive(Debug, Clone)]
pub(crate) enum IssueOutcome {
    Merged(MergeResult),
    Failed {
        reason: FailureReason,
        merge_result: Option<MergeResult>,
    },
}

impl IssueEvent {
    pub(crate) fn issue_id(&self) -> &str {
        match self {
            IssueEvent::WorkerSucceeded { issue_id, .. }
            | IssueEvent::MergeStarted { issue_id, .. }
            | IssueEvent::MergeRetry { issue_id, .. }
            | IssueEvent::Finished { issue_id, .. } => issue_id,
        }
    }
}
