//! Sprint execution: worktrees, workers, merges and the control loop

pub mod config;
pub mod core;
pub mod merge_coordinator;
pub mod report;
pub mod worker;
pub mod worktree_manager;

pub use config::OrchestratorConfig;
pub use core::Orchestrator;
pub use merge_coordinator::{
    CoordinatorConfig, LeakDetector, LeakWindow, MergeCoordinator, MergeProgress, MergeRequest,
};
pub use report::{IssueSummary, RunSummary};
pub use worker::{CancelToken, CommandWorker, WorkerOutcome, WorkerRequest, WorkerTask};
pub use worktree_manager::WorktreeManager;
