//! Integration tests for weave orchestration
//!
//! Every test drives a real temporary git repository through the
//! orchestrator with a scripted worker.

pub mod cancellation;
pub mod failures;
pub mod helpers;
pub mod resume;
pub mod scenarios;
pub mod sweep;
