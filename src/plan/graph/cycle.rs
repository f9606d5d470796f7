//! Kahn's algorithm over the index arena, used for cycle detection

use std::collections::{BTreeSet, VecDeque};

/// Topologically order nodes so every node follows its dependencies.
///
/// `deps[i]` holds the nodes that must come before `i`. On a cycle, returns
/// the nodes that could not be ordered, pruned of nodes that merely sit
/// downstream of a cycle.
pub fn topological_order(deps: &[BTreeSet<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = deps.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];

    for (node, node_deps) in deps.iter().enumerate() {
        in_degree[node] = node_deps.len();
        for &dep in node_deps {
            dependents[dep].push(node);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let mut remaining: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();

    // Peel off nodes nothing in the remainder waits on; what is left sits on a cycle.
    loop {
        let downstream: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&node| !dependents[node].iter().any(|d| remaining.contains(d)))
            .collect();
        if downstream.is_empty() {
            break;
        }
        for node in downstream {
            remaining.remove(&node);
        }
    }

    Err(remaining.into_iter().collect())
}
