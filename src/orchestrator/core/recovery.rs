//! Reconciling persisted RunState with a new run

use anyhow::Result;
use tracing::info;

use crate::fs::StateStore;
use crate::git::{branch_exists, branch_name_for_issue};
use crate::models::{RunState, RunStatus};
use crate::plan::DependencyGraph;

/// Load the previous state for this sprint or start a fresh one.
///
/// Terminal records are kept. Interrupted `Scheduled`/`Running` records go
/// back to `Pending`. `AwaitingMerge`/`Merging` records keep their worker
/// output when the issue branch still exists, so only the merge reruns.
pub(crate) fn load_or_init(
    store: &StateStore,
    repo_root: &std::path::Path,
    sprint: &str,
    target_branch: &str,
    graph: &DependencyGraph,
) -> Result<RunState> {
    let ids = graph.ids().iter().map(String::as_str);

    let mut state = match store.load()? {
        Some(state) if state.sprint == sprint && state.target_branch == target_branch => {
            info!(sprint, "Resuming previous run");
            state
        }
        Some(state) => {
            info!(
                previous = %state.sprint,
                sprint,
                "Previous run state belongs to another sprint; starting fresh"
            );
            return Ok(RunState::new(sprint, target_branch, ids));
        }
        None => return Ok(RunState::new(sprint, target_branch, ids)),
    };

    state.records.retain(|id, _| graph.contains(id));
    state.ensure_records(ids);

    for record in state.records.values_mut() {
        let resumable = record.has_pending_merge()
            && branch_exists(&branch_name_for_issue(&record.issue_id), repo_root);
        match record.status {
            RunStatus::Scheduled | RunStatus::Running => {
                info!(issue_id = %record.issue_id, "Rescheduling interrupted issue");
                record.reset_interrupted();
            }
            RunStatus::AwaitingMerge | RunStatus::Merging if !resumable => {
                info!(issue_id = %record.issue_id, "Worker output lost; rescheduling");
                record.reset_interrupted();
            }
            _ => {}
        }
    }

    Ok(state)
}
