//! Execution planner: turns a validated graph into an ExecutionPlan (§4.3)

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::graph::DependencyGraph;
use crate::model::OperationType;
use std::collections::HashMap;

/// Per-batch duration estimate (§4.3): a display/pacing hint, never a
/// scheduling input.
fn operation_duration_estimate(operation_type: OperationType) -> f64 {
    match operation_type {
        OperationType::Create => 0.5,
        OperationType::Update => 0.3,
        OperationType::Delete => 0.2,
        OperationType::Noop => 0.01,
        OperationType::Orphan => 0.0,
    }
}

/// One unit of intra-batch parallelism: all operations here have no graph
/// path between them (§3 "ExecutionBatch").
#[derive(Debug, Clone)]
pub struct ExecutionBatch {
    pub batch_id: usize,
    pub operations: Vec<String>,
    pub depth: usize,
    pub estimated_duration: f64,
}

/// The full ordered sequence of batches a plan will execute (§3 "ExecutionPlan").
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub batches: Vec<ExecutionBatch>,
    pub total_operations: usize,
    pub max_parallelism: usize,
    pub estimated_total_duration: f64,
    pub metadata: HashMap<OperationType, usize>,
}

/// Builds an [`ExecutionPlan`] from a [`DependencyGraph`] (§4.3).
#[derive(Debug, Clone)]
pub struct ExecutionPlanner {
    max_batch_size: Option<usize>,
}

impl ExecutionPlanner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
        }
    }

    /// Validate the graph, obtain depth-batches, split any batch exceeding
    /// `max_batch_size`, and attach duration/metadata.
    pub fn plan(&self, graph: &mut DependencyGraph) -> EngineResult<ExecutionPlan> {
        graph.validate()?;
        let depth_batches = graph.topological_batches()?;

        let mut batches: Vec<ExecutionBatch> = Vec::new();
        let mut next_batch_id = 0usize;
        for (depth, node_ids) in depth_batches.into_iter().enumerate() {
            if node_ids.is_empty() {
                continue;
            }
            for chunk in split_batch(&node_ids, self.max_batch_size) {
                let estimated_duration = chunk
                    .iter()
                    .map(|id| operation_duration_estimate(graph.node(id).unwrap().operation.operation_type))
                    .fold(0.0_f64, f64::max);
                batches.push(ExecutionBatch {
                    batch_id: next_batch_id,
                    operations: chunk,
                    depth,
                    estimated_duration,
                });
                next_batch_id += 1;
            }
        }

        let total_operations: usize = batches.iter().map(|b| b.operations.len()).sum();
        let max_parallelism = batches.iter().map(|b| b.operations.len()).max().unwrap_or(0);
        let estimated_total_duration: f64 = batches.iter().map(|b| b.estimated_duration).sum();

        let mut metadata: HashMap<OperationType, usize> = HashMap::new();
        for batch in &batches {
            for node_id in &batch.operations {
                *metadata
                    .entry(graph.node(node_id).unwrap().operation.operation_type)
                    .or_insert(0) += 1;
            }
        }

        Ok(ExecutionPlan {
            batches,
            total_operations,
            max_parallelism,
            estimated_total_duration,
            metadata,
        })
    }

    /// Reorder operations **within** each batch by
    /// `(operation_type, object_type, row_id)` for deterministic, locality-
    /// friendly execution order. Never reorders across batches (§4.3).
    pub fn optimize_plan(&self, plan: &mut ExecutionPlan, graph: &DependencyGraph) {
        for batch in &mut plan.batches {
            batch.operations.sort_by(|a, b| {
                let oa = &graph.node(a).unwrap().operation;
                let ob = &graph.node(b).unwrap().operation;
                (oa.operation_type as u8, oa.object_type, oa.row_id.to_string()).cmp(&(
                    ob.operation_type as u8,
                    ob.object_type,
                    ob.row_id.to_string(),
                ))
            });
        }
    }
}

fn split_batch(node_ids: &[String], max_batch_size: Option<usize>) -> Vec<Vec<String>> {
    match max_batch_size {
        Some(max) if max > 0 && node_ids.len() > max => {
            node_ids.chunks(max).map(|chunk| chunk.to_vec()).collect()
        }
        _ => vec![node_ids.to_vec()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use crate::model::{ObjectType, Operation, OperationStatus, Row, RowAction, RowId};
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
            status: OperationStatus::Pending,
            error_message: None,
        }
    }

    #[test]
    fn plan_groups_batches_by_depth() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        let b = graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Create));
        graph.add_dependency(&b, &a, EdgeKind::ParentChild).unwrap();
        graph.recompute_depths().unwrap();

        let config = EngineConfig::default();
        let planner = ExecutionPlanner::new(&config);
        let plan = planner.plan(&mut graph).unwrap();
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.total_operations, 2);
        assert_eq!(plan.batches[0].operations, vec![a]);
        assert_eq!(plan.batches[1].operations, vec![b]);
    }

    #[test]
    fn max_batch_size_splits_a_large_depth_level() {
        let mut graph = DependencyGraph::new();
        for i in 0..5 {
            graph.add_node(op(ObjectType::Ip4Block, i, OperationType::Create));
        }
        graph.recompute_depths().unwrap();

        let mut config = EngineConfig::default();
        config.max_batch_size = Some(2);
        let planner = ExecutionPlanner::new(&config);
        let plan = planner.plan(&mut graph).unwrap();
        assert_eq!(plan.batches.len(), 3);
        assert_eq!(plan.batches[0].operations.len(), 2);
        assert_eq!(plan.batches[1].operations.len(), 2);
        assert_eq!(plan.batches[2].operations.len(), 1);
        assert_eq!(plan.total_operations, 5);
    }

    #[test]
    fn optimize_plan_sorts_within_batch_deterministically() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Update));
        let b = graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        graph.recompute_depths().unwrap();

        let config = EngineConfig::default();
        let planner = ExecutionPlanner::new(&config);
        let mut plan = planner.plan(&mut graph).unwrap();
        planner.optimize_plan(&mut plan, &graph);
        // CREATE (0) sorts before UPDATE (1) regardless of insertion order.
        assert_eq!(plan.batches[0].operations, vec![b, a]);
    }

    #[test]
    fn estimated_duration_is_the_max_among_batch_operations() {
        let mut graph = DependencyGraph::new();
        graph.add_node(op(ObjectType::Ip4Block, 1, OperationType::Create));
        graph.add_node(op(ObjectType::Ip4Network, 2, OperationType::Noop));
        graph.recompute_depths().unwrap();

        let config = EngineConfig::default();
        let planner = ExecutionPlanner::new(&config);
        let plan = planner.plan(&mut graph).unwrap();
        assert_eq!(plan.batches[0].estimated_duration, 0.5);
    }
}
