//! Applying issue events to RunState

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::models::{RunStatus, WorktreeState};

use super::events::{IssueEvent, IssueOutcome};
use super::persistence::Persistence;
use super::Orchestrator;

pub(super) trait EventHandler: Persistence {
    fn handle_event(&mut self, event: IssueEvent) -> Result<()>;
}

impl EventHandler for Orchestrator {
    fn handle_event(&mut self, event: IssueEvent) -> Result<()> {
        if !self.in_flight.contains_key(event.issue_id()) {
            debug!(issue_id = event.issue_id(), "Ignoring event for issue no longer in flight");
            return Ok(());
        }

        match event {
            IssueEvent::WorkerSucceeded {
                issue_id,
                output_ref,
            } => {
                self.update_record(&issue_id, |record| {
                    record.transition_to(RunStatus::AwaitingMerge)?;
                    record.worker_output_ref = Some(output_ref);
                    Ok(())
                })?;
            }
            IssueEvent::MergeStarted { issue_id, attempt } => {
                debug!(issue_id = %issue_id, attempt, "Merge started");
                self.worktrees.mark(&issue_id, WorktreeState::Merging);
                self.update_record(&issue_id, |record| {
                    record.transition_to(RunStatus::Merging)
                })?;
            }
            IssueEvent::MergeRetry {
                issue_id,
                attempt,
                conflict_files,
            } => {
                warn!(
                    issue_id = %issue_id,
                    attempt,
                    conflicts = ?conflict_files,
                    "Retrying merge"
                );
                self.update_record(&issue_id, |record| {
                    record.transition_to(RunStatus::AwaitingMerge)
                })?;
            }
            IssueEvent::Finished { issue_id, outcome } => {
                self.in_flight.remove(&issue_id);
                match outcome {
                    IssueOutcome::Merged(result) => {
                        info!(
                            issue_id = %issue_id,
                            files = result.files_changed.len(),
                            "Completed"
                        );
                        self.update_record(&issue_id, |record| {
                            record.transition_to(RunStatus::Completed)?;
                            record.merge_result = Some(result);
                            Ok(())
                        })?;
                    }
                    IssueOutcome::Failed {
                        reason,
                        merge_result,
                    } => {
                        if merge_result.is_some() {
                            self.state.record_mut(&issue_id)?.merge_result = merge_result;
                        }
                        self.fail_issue(&issue_id, reason)?;
                    }
                }
                self.worktrees.release(&issue_id);
            }
        }
        Ok(())
    }
}
