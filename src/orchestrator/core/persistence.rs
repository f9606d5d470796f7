//! RunState mutation helpers
//!
//! The control loop is the only writer of RunState. Every helper here
//! saves the state before returning so a crash never loses a transition.

use anyhow::Result;
use tracing::{info, warn};

use crate::models::{FailureReason, RunStatus};

use super::Orchestrator;

pub(super) trait Persistence {
    /// Write RunState to disk
    fn persist(&mut self) -> Result<()>;

    /// Apply `update` to one record and persist
    fn update_record<F>(&mut self, issue_id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut crate::models::RunRecord) -> Result<()>;

    /// Fail an issue and abandon everything that waits on it
    fn fail_issue(&mut self, issue_id: &str, reason: FailureReason) -> Result<()>;

    /// Mark every not-yet-started transitive dependent of `failed` as Abandoned
    fn abandon_dependents(&mut self, failed: &str) -> Result<()>;
}

impl Persistence for Orchestrator {
    fn persist(&mut self) -> Result<()> {
        self.store.save(&self.state)
    }

    fn update_record<F>(&mut self, issue_id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut crate::models::RunRecord) -> Result<()>,
    {
        update(self.state.record_mut(issue_id)?)?;
        self.persist()
    }

    fn fail_issue(&mut self, issue_id: &str, reason: FailureReason) -> Result<()> {
        warn!(issue_id, reason = reason.label(), "Issue failed: {reason}");
        self.update_record(issue_id, |record| record.fail(reason))?;
        self.abandon_dependents(issue_id)
    }

    fn abandon_dependents(&mut self, failed: &str) -> Result<()> {
        let mut changed = false;
        for dependent in self.graph.transitive_dependents(failed) {
            let record = self.state.record_mut(&dependent)?;
            if matches!(record.status, RunStatus::Pending | RunStatus::Scheduled) {
                record.abandon(failed)?;
                info!(issue_id = %dependent, dependency = failed, "Abandoned");
                changed = true;
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(())
    }
}
