use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::run_record::{RunRecord, RunStatus};

/// Every issue's RunRecord for one sprint run.
///
/// Owned by the control loop; workers report results back to it instead of
/// writing here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub sprint: String,
    pub target_branch: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub records: BTreeMap<String, RunRecord>,
}

/// Count of records per status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl RunState {
    pub fn new<I, S>(sprint: &str, target_branch: &str, issue_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        let records = issue_ids
            .into_iter()
            .map(Into::into)
            .map(|id: String| (id.clone(), RunRecord::new(id)))
            .collect();
        Self {
            sprint: sprint.to_string(),
            target_branch: target_branch.to_string(),
            started_at: now,
            updated_at: now,
            records,
        }
    }

    pub fn record(&self, issue_id: &str) -> Option<&RunRecord> {
        self.records.get(issue_id)
    }

    pub fn record_mut(&mut self, issue_id: &str) -> Result<&mut RunRecord> {
        self.updated_at = Utc::now();
        self.records
            .get_mut(issue_id)
            .ok_or_else(|| anyhow!("Issue not found in run state: {issue_id}"))
    }

    pub fn status_of(&self, issue_id: &str) -> Option<RunStatus> {
        self.records.get(issue_id).map(|r| r.status)
    }

    /// Add Pending records for any ids this state has not seen yet
    pub fn ensure_records<'a>(&mut self, issue_ids: impl IntoIterator<Item = &'a str>) {
        for id in issue_ids {
            self.records
                .entry(id.to_string())
                .or_insert_with(|| RunRecord::new(id));
        }
    }

    pub fn is_complete(&self) -> bool {
        self.records.values().all(|r| r.status.is_terminal())
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.records.values() {
            match record.status {
                RunStatus::Pending | RunStatus::Scheduled => counts.pending += 1,
                RunStatus::Running | RunStatus::AwaitingMerge | RunStatus::Merging => {
                    counts.in_flight += 1
                }
                RunStatus::Completed => counts.completed += 1,
                RunStatus::Failed => counts.failed += 1,
                RunStatus::Abandoned => counts.abandoned += 1,
            }
        }
        counts
    }
}
