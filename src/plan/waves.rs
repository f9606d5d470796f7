//! Layered scheduling of the dependency graph into waves

use std::collections::BTreeSet;

use serde::Serialize;

use super::graph::DependencyGraph;

/// Ordered wave-sets; each inner list is sorted by issue id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WavePlan {
    pub waves: Vec<Vec<String>>,
}

impl WavePlan {
    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<String>> {
        self.waves.iter()
    }

    /// Wave index an issue was placed in
    pub fn wave_of(&self, issue_id: &str) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|id| id == issue_id))
    }

    pub fn issue_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

/// Layer the graph into waves.
///
/// Each layer holds every node whose dependencies sit in earlier layers.
/// With `p0_sequential`, the P0 members of a layer are split out into
/// singleton waves that run ahead of the rest of that layer.
pub fn schedule(graph: &DependencyGraph, p0_sequential: bool) -> WavePlan {
    let deps = graph.node_deps();
    let ids = graph.ids();
    let mut placed: BTreeSet<usize> = BTreeSet::new();
    let mut waves = Vec::new();

    while placed.len() < ids.len() {
        // Arena order is id order, so layers come out sorted
        let layer: Vec<usize> = (0..ids.len())
            .filter(|i| !placed.contains(i))
            .filter(|&i| deps[i].iter().all(|d| placed.contains(d)))
            .collect();

        if layer.is_empty() {
            // Unreachable for graphs built by DependencyGraph::build
            break;
        }

        let (urgent, rest): (Vec<usize>, Vec<usize>) = if p0_sequential {
            layer
                .iter()
                .copied()
                .partition(|&i| graph.priority(&ids[i]).is_some_and(|p| p.is_p0()))
        } else {
            (Vec::new(), layer.clone())
        };

        for i in urgent {
            waves.push(vec![ids[i].clone()]);
        }
        if !rest.is_empty() {
            waves.push(rest.iter().map(|&i| ids[i].clone()).collect());
        }

        placed.extend(layer);
    }

    WavePlan { waves }
}
