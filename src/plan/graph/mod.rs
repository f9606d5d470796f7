//! Dependency graph over issue ids
//!
//! An edge `A -> B` means "B must reach a terminal state before A starts".
//! Edges come from declared blockers and from inferred file overlap. Nodes
//! live in an arena indexed by position, sorted by id, so every traversal
//! is deterministic.

mod conflict;
mod cycle;


use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::models::{IssueDescriptor, Priority};

pub use conflict::{conflict_score, ConflictScore};
pub(crate) use cycle::topological_order;

/// Why an edge exists
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// From the issue's `blocked_by` list
    Declared,
    /// From overlapping declared files
    Inferred {
        score: f64,
        shared_files: Vec<String>,
    },
}

/// `issue` waits for `blocker`
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    pub issue: String,
    pub blocker: String,
    pub kind: EdgeKind,
}

/// A declared blocker that is not part of this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedBlocker {
    pub issue: String,
    pub blocker: String,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    priorities: Vec<Priority>,
    /// deps[i]: nodes that must finish before node i starts
    deps: Vec<BTreeSet<usize>>,
    edges: Vec<DependencyEdge>,
    dropped: Vec<DroppedBlocker>,
}

impl DependencyGraph {
    /// Build the graph for a run.
    ///
    /// Declared blockers are checked for cycles before any inferred edge is
    /// considered. An inferred edge is only added between issues that are not
    /// already ordered, so inference can never introduce a cycle.
    pub fn build(
        issues: &[IssueDescriptor],
        conflict_threshold: f64,
    ) -> Result<Self, OrchestratorError> {
        let mut sorted: Vec<&IssueDescriptor> = issues.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let ids: Vec<String> = sorted.iter().map(|i| i.id.clone()).collect();
        let index: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut graph = Self {
            priorities: sorted.iter().map(|i| i.priority).collect(),
            deps: vec![BTreeSet::new(); ids.len()],
            ids,
            index,
            edges: Vec::new(),
            dropped: Vec::new(),
        };

        for issue in &sorted {
            let node = graph.index[&issue.id];
            for blocker in &issue.declared_blockers {
                match graph.index.get(blocker) {
                    Some(&dep) => graph.add_edge(node, dep, EdgeKind::Declared),
                    None => {
                        warn!(
                            issue_id = %issue.id,
                            blocker = %blocker,
                            "Dropping blocker that is not part of this run"
                        );
                        graph.dropped.push(DroppedBlocker {
                            issue: issue.id.clone(),
                            blocker: blocker.clone(),
                        });
                    }
                }
            }
        }

        graph.check_acyclic()?;

        for i in 0..sorted.len() {
            for j in (i + 1)..sorted.len() {
                let score = conflict_score(&sorted[i].declared_files, &sorted[j].declared_files);
                if score.score <= conflict_threshold {
                    continue;
                }

                let (waiter, first) = graph.inferred_direction(i, j);
                if graph.depends_on(waiter, first) || graph.depends_on(first, waiter) {
                    debug!(
                        issue_id = %graph.ids[waiter],
                        other = %graph.ids[first],
                        "Overlapping issues already ordered"
                    );
                    continue;
                }

                debug!(
                    issue_id = %graph.ids[waiter],
                    blocker = %graph.ids[first],
                    score = score.score,
                    "Inferred dependency from shared files"
                );
                graph.add_edge(
                    waiter,
                    first,
                    EdgeKind::Inferred {
                        score: score.score,
                        shared_files: score.shared_files,
                    },
                );
            }
        }

        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Decide which of two overlapping issues waits.
    ///
    /// The more urgent issue (lower ordinal) goes first; on equal priority the
    /// lexicographically smaller id goes first. Returns `(waiter, first)`.
    fn inferred_direction(&self, a: usize, b: usize) -> (usize, usize) {
        let (pa, pb) = (self.priorities[a], self.priorities[b]);
        if pa != pb {
            if pa < pb {
                (b, a)
            } else {
                (a, b)
            }
        } else if self.ids[a] < self.ids[b] {
            (b, a)
        } else {
            (a, b)
        }
    }

    fn add_edge(&mut self, node: usize, dep: usize, kind: EdgeKind) {
        if self.deps[node].insert(dep) {
            self.edges.push(DependencyEdge {
                issue: self.ids[node].clone(),
                blocker: self.ids[dep].clone(),
                kind,
            });
        }
    }

    fn check_acyclic(&self) -> Result<(), OrchestratorError> {
        topological_order(&self.deps).map(|_| ()).map_err(|members| {
            OrchestratorError::CycleDetected {
                issues: members.into_iter().map(|i| self.ids[i].clone()).collect(),
            }
        })
    }

    /// Whether `node` transitively waits on `target`
    fn depends_on(&self, node: usize, target: usize) -> bool {
        let mut stack = vec![node];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            for &dep in &self.deps[current] {
                if dep == target {
                    return true;
                }
                if seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Issue ids in arena (sorted) order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, issue_id: &str) -> bool {
        self.index.contains_key(issue_id)
    }

    pub fn priority(&self, issue_id: &str) -> Option<Priority> {
        self.index.get(issue_id).map(|&i| self.priorities[i])
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn dropped_blockers(&self) -> &[DroppedBlocker] {
        &self.dropped
    }

    /// Whether `issue` directly waits on `blocker`
    pub fn has_edge(&self, issue: &str, blocker: &str) -> bool {
        match (self.index.get(issue), self.index.get(blocker)) {
            (Some(&i), Some(&b)) => self.deps[i].contains(&b),
            _ => false,
        }
    }

    /// Direct dependencies of an issue, sorted by id
    pub fn dependencies(&self, issue_id: &str) -> Vec<&str> {
        self.index
            .get(issue_id)
            .map(|&i| self.deps[i].iter().map(|&d| self.ids[d].as_str()).collect())
            .unwrap_or_default()
    }

    /// Every issue that directly or transitively waits on `issue_id`
    pub fn transitive_dependents(&self, issue_id: &str) -> BTreeSet<String> {
        let Some(&start) = self.index.get(issue_id) else {
            return BTreeSet::new();
        };

        let mut found = BTreeSet::new();
        let mut frontier = vec![start];
        while let Some(current) = frontier.pop() {
            for (node, deps) in self.deps.iter().enumerate() {
                if deps.contains(&current) && found.insert(node) {
                    frontier.push(node);
                }
            }
        }
        found.into_iter().map(|i| self.ids[i].clone()).collect()
    }

    pub(crate) fn node_deps(&self) -> &[BTreeSet<usize>] {
        &self.deps
    }
}
