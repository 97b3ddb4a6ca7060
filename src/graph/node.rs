//! Dependency graph node (§3 "DependencyNode")

use crate::model::Operation;
use std::collections::BTreeSet;

/// The kind of edge connecting two nodes (§4.2 `add_dependency`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// The dependency is the dependent's logical parent container
    ParentChild,
    /// The dependency must exist before the dependent can be attempted, with
    /// no containment relationship implied (e.g. phase barriers)
    Prerequisite,
    /// The dependency is referenced by name/value from the dependent's payload
    Reference,
}

/// One node in the dependency graph: an operation plus its edges.
///
/// `dependencies`/`dependents` are `BTreeSet<String>` rather than
/// `HashSet<String>` so iteration order (used by cascade DFS and by tests
/// asserting on skip order) is deterministic without a separate sort step.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub operation: Operation,
    pub dependencies: BTreeSet<String>,
    pub dependents: BTreeSet<String>,
    pub depth: usize,
}

impl DependencyNode {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            depth: 0,
        }
    }

    pub fn node_id(&self) -> String {
        self.operation.node_id()
    }
}
