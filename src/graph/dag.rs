//! The dependency graph itself (§4.2, §3 "DependencyGraph invariants")

use super::node::{DependencyNode, EdgeKind};
use crate::error::{EngineError, EngineResult};
use crate::model::{ObjectType, Operation, OperationType};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// DAG of operations keyed by `"{object_type}:{row_id}"` (§3).
///
/// Three secondary indexes are kept alongside `nodes` so the executor and
/// planner never have to scan the whole node map: `nodes_by_type` for
/// dependency-detection lookups, `nodes_by_operation` for cascade/metrics
/// bookkeeping, and `create_operations_by_type` for conflict-resolution
/// natural-key lookups that only ever care about CREATEs.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, DependencyNode>,
    nodes_by_type: HashMap<ObjectType, HashSet<String>>,
    nodes_by_operation: HashMap<OperationType, HashSet<String>>,
    create_operations_by_type: HashMap<ObjectType, HashSet<String>>,
    validated: bool,
    next_barrier_seq: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&DependencyNode> {
        self.nodes.get(node_id)
    }

    /// Mutable node access, used by the executor to advance operation status
    /// and by cascade propagation to mark dependents SKIPPED. The graph's
    /// edge sets and indexes are untouched by these mutations; only
    /// `DependencyNode::operation` changes after graph build time.
    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut DependencyNode> {
        self.nodes.get_mut(node_id)
    }

    /// Dependent node ids of `node_id`, or an empty iterator if unknown.
    pub fn dependents_of<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a str> {
        self.nodes
            .get(node_id)
            .into_iter()
            .flat_map(|n| n.dependents.iter().map(String::as_str))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    pub fn ids_by_type(&self, object_type: ObjectType) -> impl Iterator<Item = &str> {
        self.nodes_by_type
            .get(&object_type)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn create_ids_by_type(&self, object_type: ObjectType) -> impl Iterator<Item = &str> {
        self.create_operations_by_type
            .get(&object_type)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Add a node for `operation` (§4.2 "Node addition"). Idempotent: a
    /// duplicate id is logged and the existing node id is returned unchanged.
    pub fn add_node(&mut self, operation: Operation) -> String {
        let node_id = operation.node_id();
        if self.nodes.contains_key(&node_id) {
            tracing::warn!(node_id = %node_id, "duplicate node id ignored");
            return node_id;
        }

        self.nodes_by_type
            .entry(operation.object_type)
            .or_default()
            .insert(node_id.clone());
        self.nodes_by_operation
            .entry(operation.operation_type)
            .or_default()
            .insert(node_id.clone());
        if operation.operation_type == OperationType::Create {
            self.create_operations_by_type
                .entry(operation.object_type)
                .or_default()
                .insert(node_id.clone());
        }

        self.nodes.insert(node_id.clone(), DependencyNode::new(operation));
        self.validated = false;
        node_id
    }

    /// Insert a synthetic `system_barrier` NOOP node, returning its id.
    pub fn add_barrier_node(&mut self, phase: usize) -> String {
        self.next_barrier_seq += 1;
        let operation = super::detect::barrier_operation(phase, self.next_barrier_seq);
        self.add_node(operation)
    }

    /// Add an edge `dependent depends on dependency` (§4.2 "Edge addition").
    pub fn add_dependency(
        &mut self,
        dependent: &str,
        dependency: &str,
        kind: EdgeKind,
    ) -> EngineResult<()> {
        if !self.nodes.contains_key(dependent) {
            return Err(EngineError::MissingNode(dependent.to_string()));
        }
        if !self.nodes.contains_key(dependency) {
            return Err(EngineError::MissingNode(dependency.to_string()));
        }
        if dependent == dependency {
            tracing::warn!(node_id = %dependent, "self-edge ignored");
            return Ok(());
        }

        tracing::debug!(dependent, dependency, ?kind, "adding dependency edge");
        self.nodes.get_mut(dependent).unwrap().dependencies.insert(dependency.to_string());
        self.nodes.get_mut(dependency).unwrap().dependents.insert(dependent.to_string());

        if self.creates_cycle(dependent) {
            self.nodes.get_mut(dependent).unwrap().dependencies.remove(dependency);
            self.nodes.get_mut(dependency).unwrap().dependents.remove(dependent);
            return Err(EngineError::CyclicDependency {
                from: dependent.to_string(),
                to: dependency.to_string(),
            });
        }

        self.validated = false;
        Ok(())
    }

    /// DFS from `start` over `dependencies` edges using an explicit
    /// recursion-path stack (not merely a visited set), so `A -> B -> A` is
    /// caught while `A -> B -> C` (a diamond, not a cycle) is not.
    fn creates_cycle(&self, start: &str) -> bool {
        let mut stack: Vec<(String, usize)> = vec![(start.to_string(), 0)];
        let mut on_path: Vec<String> = vec![start.to_string()];

        while let Some((node_id, child_idx)) = stack.pop() {
            let deps: Vec<&String> = self
                .nodes
                .get(&node_id)
                .map(|n| n.dependencies.iter().collect())
                .unwrap_or_default();

            if child_idx >= deps.len() {
                on_path.pop();
                continue;
            }
            stack.push((node_id.clone(), child_idx + 1));

            let next = deps[child_idx];
            if next == start {
                return true;
            }
            if on_path.contains(next) {
                continue;
            }
            on_path.push(next.clone());
            stack.push((next.clone(), 0));
        }
        false
    }

    /// Recompute every node's depth: 0 for roots, else `1 + max(dep.depth)`.
    /// Processes nodes in topological order so every dependency's depth is
    /// final before its dependents are visited.
    pub fn recompute_depths(&mut self) -> EngineResult<()> {
        let order = self.kahn_order()?;
        for node_id in order {
            let depth = {
                let node = &self.nodes[&node_id];
                node.dependencies
                    .iter()
                    .map(|dep| self.nodes[dep].depth)
                    .max()
                    .map(|d| d + 1)
                    .unwrap_or(0)
            };
            self.nodes.get_mut(&node_id).unwrap().depth = depth;
        }
        Ok(())
    }

    /// Kahn's algorithm: confirms acyclicity and returns a linear order.
    /// Fails with `CyclicDependency` enumerating any node Kahn's pass could
    /// not reach (§4.2 "Topological batching").
    fn kahn_order(&self) -> EngineResult<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for (id, node) in &self.nodes {
            in_degree.insert(id.as_str(), node.dependencies.len());
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            let mut freed: Vec<&str> = Vec::new();
            for dependent in &self.nodes[id].dependents {
                let deg = in_degree.get_mut(dependent.as_str()).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    freed.push(dependent.as_str());
                }
            }
            freed.sort_unstable();
            for id in freed {
                queue.push_back(id);
            }
        }

        if order.len() != self.nodes.len() {
            let processed: HashSet<&str> = order.iter().map(String::as_str).collect();
            let unprocessed: Vec<String> = self
                .nodes
                .keys()
                .filter(|id| !processed.contains(id.as_str()))
                .cloned()
                .collect();
            return Err(EngineError::ResidualCycle(unprocessed.len(), unprocessed));
        }
        Ok(order)
    }

    /// Group nodes by depth (ascending); each depth level is one batch
    /// (§4.2 "Topological batching").
    pub fn topological_batches(&self) -> EngineResult<Vec<Vec<String>>> {
        self.kahn_order()?;

        let max_depth = self.nodes.values().map(|n| n.depth).max().unwrap_or(0);
        let mut batches: Vec<Vec<String>> = vec![Vec::new(); max_depth + 1];
        for (id, node) in &self.nodes {
            batches[node.depth].push(id.clone());
        }
        for batch in &mut batches {
            batch.sort();
        }
        Ok(batches)
    }

    /// Cross-check index/edge consistency and re-confirm acyclicity
    /// (§4.3 "Validates the graph first").
    pub fn validate(&mut self) -> EngineResult<()> {
        for (id, node) in &self.nodes {
            for dep in &node.dependencies {
                let dep_node = self
                    .nodes
                    .get(dep)
                    .ok_or_else(|| EngineError::MissingNode(dep.clone()))?;
                if !dep_node.dependents.contains(id) {
                    return Err(EngineError::Internal(format!(
                        "asymmetric edge: {id} depends on {dep} but {dep} has no matching dependent"
                    )));
                }
            }
        }
        self.kahn_order()?;
        self.validated = true;
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectType, Operation, OperationType, Row, RowAction, RowId};
    use std::collections::HashMap as Map;

    fn op(object_type: ObjectType, row_id: i64, operation_type: OperationType) -> Operation {
        Operation {
            object_type,
            row_id: RowId::Int(row_id),
            operation_type,
            resource_id: None,
            payload: Map::new(),
            csv_row: Row {
                row_id: RowId::Int(row_id),
                object_type,
                action: RowAction::Create,
                bam_id: None,
                attributes: Map::new(),
            },
            status: crate::model::OperationStatus::Pending,
            error_message: None,
        }
    }

    #[test]
    fn duplicate_node_is_idempotent() {
        let mut graph = DependencyGraph::new();
        let id1 = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let id2 = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        assert_eq!(id1, id2);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn self_edge_is_a_no_op() {
        let mut graph = DependencyGraph::new();
        let id = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        graph.add_dependency(&id, &id, EdgeKind::ParentChild).unwrap();
        assert!(graph.node(&id).unwrap().dependencies.is_empty());
    }

    #[test]
    fn missing_node_edge_fails() {
        let mut graph = DependencyGraph::new();
        let id = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let err = graph.add_dependency(&id, "ip4_network:99", EdgeKind::ParentChild).unwrap_err();
        assert!(matches!(err, EngineError::MissingNode(_)));
    }

    #[test]
    fn two_hop_chain_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let b = graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Create));
        let c = graph.add_node(op(ObjectType::Ip4Address, 3, OperationType::Create));
        graph.add_dependency(&b, &a, EdgeKind::ParentChild).unwrap();
        graph.add_dependency(&c, &b, EdgeKind::ParentChild).unwrap();
        assert_eq!(graph.node(&b).unwrap().dependencies.len(), 1);
        assert_eq!(graph.node(&c).unwrap().dependencies.len(), 1);
    }

    #[test]
    fn direct_cycle_is_rejected_and_rolled_back() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let b = graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Create));
        graph.add_dependency(&b, &a, EdgeKind::ParentChild).unwrap();
        let err = graph.add_dependency(&a, &b, EdgeKind::ParentChild).unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
        // rollback: a must not depend on b after the rejected edge
        assert!(!graph.node(&a).unwrap().dependencies.contains(&b));
        assert!(!graph.node(&b).unwrap().dependents.contains(&a));
    }

    #[test]
    fn depths_follow_longest_path() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let b = graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Create));
        let c = graph.add_node(op(ObjectType::Ip4Address, 3, OperationType::Create));
        graph.add_dependency(&b, &a, EdgeKind::ParentChild).unwrap();
        graph.add_dependency(&c, &b, EdgeKind::ParentChild).unwrap();
        graph.recompute_depths().unwrap();
        assert_eq!(graph.node(&a).unwrap().depth, 0);
        assert_eq!(graph.node(&b).unwrap().depth, 1);
        assert_eq!(graph.node(&c).unwrap().depth, 2);
    }

    #[test]
    fn topological_batches_group_by_depth() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let b = graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Create));
        let c = graph.add_node(op(ObjectType::Ip4Network, 3, OperationType::Create));
        graph.add_dependency(&b, &a, EdgeKind::ParentChild).unwrap();
        graph.add_dependency(&c, &a, EdgeKind::ParentChild).unwrap();
        graph.recompute_depths().unwrap();
        let batches = graph.topological_batches().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec![a]);
        let mut rest = batches[1].clone();
        rest.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(rest, expected);
    }

    #[test]
    fn validate_passes_on_a_consistent_acyclic_graph() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let b = graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Create));
        graph.add_dependency(&b, &a, EdgeKind::ParentChild).unwrap();
        assert!(graph.validate().is_ok());
        assert!(graph.is_validated());
    }
}
