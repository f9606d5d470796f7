pub mod issue;
pub mod merge;
pub mod run_record;
pub mod run_state;
pub mod worktree;

pub use issue::{IssueDescriptor, Priority};
pub use merge::{MergeOutcome, MergeResult};
pub use run_record::{FailureReason, RunRecord, RunStatus};
pub use run_state::{RunState, StatusCounts};
pub use worktree::{WorktreeHandle, WorktreeState};
