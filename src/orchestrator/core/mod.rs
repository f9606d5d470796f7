//! Control loop for a sprint run
//!
//! The orchestrator owns RunState and is its only writer. It walks the wave
//! plan, provisions a worktree per issue, starts one thread per issue (worker
//! then merge), and applies the events those threads send back:
//! - Issue threads never mutate shared state
//! - Merges go through the single [`MergeCoordinator`](super::merge_coordinator::MergeCoordinator)
//! - A failure abandons every transitive dependent that has not started

mod event_handler;
mod events;
mod executor;
mod orchestrator;
mod persistence;
mod recovery;

pub use orchestrator::Orchestrator;
