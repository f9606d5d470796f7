//! Sprint loading, dependency mapping, and wave scheduling
//!
//! This module handles:
//! - Loading the sprint definition and its issue descriptors
//! - Building the dependency graph
//! - Layering the graph into waves

pub mod graph;
pub mod issues;
pub mod schema;
pub mod waves;

pub use graph::{DependencyEdge, DependencyGraph, EdgeKind};
pub use issues::{load_issues, normalize_issues};
pub use schema::{ExecutionOptions, MergeStyle, SprintDefinition, WorkerConfig, WorktreeSettings};
pub use waves::{schedule, WavePlan};
