//! Concurrent batch executor: per-batch fan-out/fan-in, cascading failure
//! propagation, checkpointing (§4.6, §5 "Concurrency model")

mod cascade;
mod dispatch;
pub mod handlers;

pub use cascade::cascade_failure;
pub use dispatch::{dispatch_operation, preexisting_error_result, DispatchOutcome};
pub use handlers::HandlerOutcome;

use crate::collaborators::{IpamClient, ResolverCache};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::graph::DependencyGraph;
use crate::model::{ObjectType, OperationResult, OperationStatus, OperationType};
use crate::persistence::{CheckpointStatus, NewChangeLogEntry, NewCheckpoint, PersistenceStore};
use crate::planner::ExecutionPlan;
use crate::resolver::CreatedResourceMaps;
use crate::throttle::{AdaptiveThrottle, ThrottleMetrics};
use dashmap::DashSet;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Per-operation-type tally for [`ExecutionSummary`] (§4.6 "Statistics").
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Statistics surfaced after [`Executor::execute_plan`] returns.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub by_type: HashMap<OperationType, TypeStats>,
    pub throttle: ThrottleMetrics,
    /// Every node id that failed this run (§4.6.2 "Add the failed operation's
    /// node id to `failed_operations`"), independent of what it then cascaded.
    pub failed_node_ids: Vec<String>,
}

impl ExecutionSummary {
    fn empty(throttle: ThrottleMetrics) -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            by_type: HashMap::new(),
            throttle,
            failed_node_ids: Vec::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }

    fn record(&mut self, operation_type: OperationType, outcome: Outcome) {
        self.total += 1;
        let stats = self.by_type.entry(operation_type).or_default();
        stats.total += 1;
        match outcome {
            Outcome::Succeeded => {
                self.succeeded += 1;
                stats.succeeded += 1;
            }
            Outcome::Failed => {
                self.failed += 1;
                stats.failed += 1;
            }
            Outcome::Skipped => {
                self.skipped += 1;
                stats.skipped += 1;
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

/// What a spawned per-operation task resolves to, before the main loop
/// applies it back onto the graph (§5: the graph/maps are single-writer,
/// written only after the whole batch joins).
enum TaskResult {
    Success(DispatchOutcome),
    Failure(OperationResult),
    AlreadySkipped(OperationResult),
}

/// Drives a validated [`ExecutionPlan`] against an [`IpamClient`], batch by
/// batch, with adaptive throttling, cascading failure, and checkpointing.
pub struct Executor {
    config: EngineConfig,
    throttle: Arc<AdaptiveThrottle>,
    client: Arc<dyn IpamClient>,
    resolver_cache: Option<Arc<dyn ResolverCache>>,
    created: Arc<RwLock<CreatedResourceMaps>>,
    persistence: Option<Arc<PersistenceStore>>,
    session_id: String,
    failed_operations: Arc<DashSet<String>>,
}

impl Executor {
    pub fn new(config: EngineConfig, client: Arc<dyn IpamClient>, session_id: impl Into<String>) -> Self {
        let throttle = Arc::new(AdaptiveThrottle::new(&config));
        Self {
            config,
            throttle,
            client,
            resolver_cache: None,
            created: Arc::new(RwLock::new(CreatedResourceMaps::default())),
            persistence: None,
            session_id: session_id.into(),
            failed_operations: Arc::new(DashSet::new()),
        }
    }

    pub fn with_resolver_cache(mut self, cache: Arc<dyn ResolverCache>) -> Self {
        self.resolver_cache = Some(cache);
        self
    }

    pub fn with_persistence(mut self, store: Arc<PersistenceStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Preload the created-resource maps from a prior checkpoint before
    /// resuming a session (§4.7 "load_created_resources").
    pub async fn resume_created_resources(&self, maps: CreatedResourceMaps) {
        *self.created.write().await = maps;
    }

    /// Execute every batch of `plan` in order, mutating `graph`'s operation
    /// statuses as results land. Checkpoints and the change log are skipped
    /// entirely in dry-run mode (§9 OQ2).
    ///
    /// `start_batch_id` resumes a previously interrupted session (§4.6
    /// lifecycle step 1a): any batch whose `batch_id` is strictly less than
    /// it is skipped outright — not dispatched, not counted in the returned
    /// summary — on the assumption the caller already loaded that batch's
    /// outcomes (via [`Executor::resume_created_resources`] and the change
    /// log) from a prior run's checkpoint.
    pub async fn execute_plan(
        &self,
        graph: &mut DependencyGraph,
        plan: &ExecutionPlan,
        dry_run: bool,
        start_batch_id: usize,
        input_hash: &str,
        cancellation: Option<Arc<AtomicBool>>,
    ) -> EngineResult<ExecutionSummary> {
        let session_span = tracing::info_span!(
            "session",
            session_id = %self.session_id,
            total_operations = plan.total_operations,
            dry_run
        );
        let _session_guard = session_span.enter();

        let mut summary = ExecutionSummary::empty(self.throttle.metrics());
        let mut completed_operations = 0usize;

        for batch in &plan.batches {
            if batch.batch_id < start_batch_id {
                tracing::debug!(batch_id = batch.batch_id, start_batch_id, "skipping already-completed batch on resume");
                continue;
            }

            if cancellation.as_ref().map(|c| c.load(Ordering::SeqCst)).unwrap_or(false) {
                tracing::info!(batch_id = batch.batch_id, "execution cancelled before batch start");
                break;
            }

            let batch_span = tracing::info_span!(
                "batch",
                batch_id = batch.batch_id,
                depth = batch.depth,
                size = batch.operations.len()
            );
            let _batch_guard = batch_span.enter();

            let mut join_set: JoinSet<(String, TaskResult)> = JoinSet::new();
            for node_id in &batch.operations {
                let Some(node) = graph.node(node_id) else { continue };
                let operation = node.operation.clone();
                let node_id_owned = node_id.clone();

                if operation.status == OperationStatus::Skipped {
                    let reason = operation
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "skipped before dispatch".to_string());
                    join_set.spawn(async move {
                        (node_id_owned.clone(), TaskResult::AlreadySkipped(OperationResult::skipped(node_id_owned, reason)))
                    });
                    continue;
                }
                if operation.has_preexisting_error() {
                    let result = preexisting_error_result(&operation);
                    join_set.spawn(async move { (node_id_owned, TaskResult::Failure(result)) });
                    continue;
                }

                let client = Arc::clone(&self.client);
                let throttle = Arc::clone(&self.throttle);
                let created = Arc::clone(&self.created);
                let resolver_cache = self.resolver_cache.clone();
                let op_span = tracing::debug_span!(
                    "operation",
                    node_id = %node_id_owned,
                    operation_type = ?operation.operation_type
                );

                let config = self.config.clone();
                join_set.spawn(
                    async move {
                        let outcome =
                            dispatch_operation(operation, client, throttle, created, resolver_cache, &config, dry_run).await;
                        let task_result = if outcome.result.success {
                            TaskResult::Success(outcome)
                        } else {
                            TaskResult::Failure(outcome.result)
                        };
                        (node_id_owned, task_result)
                    }
                    .instrument(op_span),
                );
            }

            let mut batch_results = Vec::with_capacity(batch.operations.len());
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(pair) => batch_results.push(pair),
                    Err(join_err) => tracing::error!(error = %join_err, "operation task panicked"),
                }
            }

            for (node_id, task_result) in batch_results {
                // A node already SKIPPED by an earlier cascade (§4.6.2) was
                // counted into `completed_operations` and `summary` the
                // moment the cascade ran; it is only dispatched again here
                // to keep the join uniform, not a second terminal event, so
                // counting it again would double the skip total.
                if matches!(task_result, TaskResult::AlreadySkipped(_)) {
                    continue;
                }

                completed_operations += 1;
                let operation_type = graph
                    .node(&node_id)
                    .map(|n| n.operation.operation_type)
                    .unwrap_or(OperationType::Noop);
                let object_type = graph
                    .node(&node_id)
                    .map(|n| n.operation.object_type)
                    .unwrap_or(ObjectType::SystemBarrier);

                match task_result {
                    TaskResult::Success(outcome) => {
                        summary.record(operation_type, Outcome::Succeeded);
                        if let Some(node) = graph.node_mut(&node_id) {
                            node.operation.status = OperationStatus::Succeeded;
                            if outcome.resource_id.is_some() {
                                node.operation.resource_id = outcome.resource_id;
                            }
                        }
                        self.log_operation(dry_run, &node_id, object_type, operation_type, &outcome.result, None);
                    }
                    TaskResult::Failure(result) => {
                        summary.record(operation_type, Outcome::Failed);
                        self.failed_operations.insert(node_id.clone());
                        if let Some(node) = graph.node_mut(&node_id) {
                            node.operation.status = OperationStatus::Failed;
                            node.operation.error_message = result.error_message.clone();
                        }
                        self.log_operation(dry_run, &node_id, object_type, operation_type, &result, result.error_message.clone());

                        let error_message = result.error_message.as_deref().unwrap_or("unknown error");
                        let cascaded = cascade_failure(graph, &node_id, error_message);
                        for skipped in &cascaded {
                            let skipped_type = graph
                                .node(&skipped.node_id)
                                .map(|n| n.operation.operation_type)
                                .unwrap_or(OperationType::Noop);
                            summary.record(skipped_type, Outcome::Skipped);
                        }
                        completed_operations += cascaded.len();
                    }
                    TaskResult::AlreadySkipped(_) => unreachable!("filtered out above"),
                }
            }

            if let (Some(store), false) = (&self.persistence, dry_run) {
                if let Err(err) = store.save_checkpoint(NewCheckpoint {
                    session_id: self.session_id.clone(),
                    batch_id: batch.batch_id,
                    operation_index: batch.operations.len(),
                    completed_operations,
                    total_operations: plan.total_operations,
                    status: CheckpointStatus::InProgress,
                    input_hash: input_hash.to_string(),
                    metadata: None,
                }) {
                    tracing::warn!(error = %err, batch_id = batch.batch_id, "failed to save checkpoint");
                }
            }
        }

        summary.throttle = self.throttle.metrics();
        summary.failed_node_ids = self.failed_operations.iter().map(|r| r.clone()).collect();

        if let (Some(store), false) = (&self.persistence, dry_run) {
            let result = if summary.failed == 0 {
                store.mark_session_completed(&self.session_id)
            } else {
                store.mark_session_failed(&self.session_id, &format!("{} operation(s) failed", summary.failed))
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to finalize session status");
            }
        }

        Ok(summary)
    }

    fn log_operation(
        &self,
        dry_run: bool,
        node_id: &str,
        object_type: ObjectType,
        operation_type: OperationType,
        result: &OperationResult,
        error_message: Option<String>,
    ) {
        let Some(store) = &self.persistence else { return };
        if dry_run {
            return;
        }
        let after_state = serde_json::to_string(&result.metadata).ok();
        if let Err(err) = store.record_operation(NewChangeLogEntry {
            session_id: self.session_id.clone(),
            row_id: node_id.to_string(),
            object_type,
            operation_type,
            success: result.success,
            resource_id: result.resource_id,
            error_message,
            before_state: None,
            after_state,
        }) {
            tracing::warn!(error = %err, node_id, "failed to append change log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ClientError, NaturalKey, ResourceId};
    use crate::model::{AttrValue, Operation, OperationStatus, Payload, Row, RowAction, RowId};
    use crate::planner::ExecutionPlanner;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;
    use std::sync::atomic::AtomicI64;

    struct FakeClient {
        next_id: AtomicI64,
        fail_node: Option<String>,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                next_id: AtomicI64::new(100),
                fail_node: None,
            }
        }

        fn failing(mut self, cidr: &str) -> Self {
            self.fail_node = Some(cidr.to_string());
            self
        }
    }

    #[async_trait]
    impl IpamClient for FakeClient {
        async fn create(&self, _object_type: ObjectType, payload: &Payload) -> Result<ResourceId, ClientError> {
            if let Some(fail_cidr) = &self.fail_node {
                if payload.get("cidr").and_then(|v| v.as_str()) == Some(fail_cidr.as_str()) {
                    return Err(ClientError::Server("synthetic failure".to_string()));
                }
            }
            Ok(self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        }

        async fn update(&self, _id: ResourceId, _object_type: ObjectType, _payload: &Payload) -> Result<(), ClientError> {
            Ok(())
        }

        async fn delete(&self, _id: ResourceId, _object_type: ObjectType, _allow_dangerous: bool) -> Result<(), ClientError> {
            Ok(())
        }

        async fn find_by_natural_key(
            &self,
            _object_type: ObjectType,
            _natural_key: &NaturalKey,
        ) -> Result<Option<ResourceId>, ClientError> {
            Ok(None)
        }
    }

    fn create_op(object_type: ObjectType, row_id: i64, cidr: &str) -> Operation {
        let mut payload: Payload = Map::new();
        payload.insert("cidr".to_string(), serde_json::Value::String(cidr.to_string()));
        let mut attributes = Map::new();
        attributes.insert("cidr".to_string(), AttrValue::Str(cidr.to_string()));
        Operation {
            object_type,
            row_id: RowId::Int(row_id),
            operation_type: OperationType::Create,
            resource_id: None,
            payload,
            csv_row: Row {
                row_id: RowId::Int(row_id),
                object_type,
                action: RowAction::Create,
                bam_id: None,
                attributes,
            },
            status: OperationStatus::Pending,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn successful_batch_marks_every_node_succeeded_and_records_ids() {
        let mut graph = DependencyGraph::new();
        graph.add_node(create_op(ObjectType::Ip4Block, 1, "10.0.0.0/8"));
        graph.add_node(create_op(ObjectType::Ip4Network, 2, "10.0.0.0/24"));
        graph.recompute_depths().unwrap();

        let config = EngineConfig::default();
        let plan = ExecutionPlanner::new(&config).plan(&mut graph).unwrap();
        let executor = Executor::new(config, Arc::new(FakeClient::new()), "s1");

        let summary = executor.execute_plan(&mut graph, &plan, false, 0, "hash", None).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
        for node in graph.nodes() {
            assert_eq!(node.operation.status, OperationStatus::Succeeded);
            assert!(node.operation.resource_id.is_some());
        }
    }

    #[tokio::test]
    async fn a_failed_create_cascades_a_skip_to_its_dependent() {
        let mut graph = DependencyGraph::new();
        let parent = graph.add_node(create_op(ObjectType::Ip4Block, 1, "10.0.0.0/8"));
        let child = graph.add_node(create_op(ObjectType::Ip4Network, 2, "10.0.0.0/24"));
        graph.add_dependency(&child, &parent, crate::graph::EdgeKind::ParentChild).unwrap();
        graph.recompute_depths().unwrap();

        let config = EngineConfig::default();
        let plan = ExecutionPlanner::new(&config).plan(&mut graph).unwrap();
        let executor = Executor::new(config, Arc::new(FakeClient::new().failing("10.0.0.0/8")), "s1");

        let summary = executor.execute_plan(&mut graph, &plan, false, 0, "hash", None).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(graph.node(&parent).unwrap().operation.status, OperationStatus::Failed);
        assert_eq!(graph.node(&child).unwrap().operation.status, OperationStatus::Skipped);
    }

    #[tokio::test]
    async fn dry_run_assigns_synthetic_ids_without_calling_the_client() {
        let mut graph = DependencyGraph::new();
        graph.add_node(create_op(ObjectType::Ip4Block, 1, "10.0.0.0/8"));
        graph.recompute_depths().unwrap();

        let config = EngineConfig::default();
        let plan = ExecutionPlanner::new(&config).plan(&mut graph).unwrap();
        let executor = Executor::new(config, Arc::new(FakeClient::new()), "s1");

        let summary = executor.execute_plan(&mut graph, &plan, true, 0, "hash", None).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        for node in graph.nodes() {
            assert!(node.operation.resource_id.unwrap() > 0);
        }
    }

    #[tokio::test]
    async fn cancellation_flag_stops_before_the_next_batch() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node(create_op(ObjectType::Ip4Block, 1, "10.0.0.0/8"));
        let b = graph.add_node(create_op(ObjectType::Ip4Network, 2, "10.0.0.0/24"));
        graph.add_dependency(&b, &a, crate::graph::EdgeKind::ParentChild).unwrap();
        graph.recompute_depths().unwrap();

        let config = EngineConfig::default();
        let plan = ExecutionPlanner::new(&config).plan(&mut graph).unwrap();
        let executor = Executor::new(config, Arc::new(FakeClient::new()), "s1");

        let cancel = Arc::new(AtomicBool::new(true));
        let summary = executor.execute_plan(&mut graph, &plan, false, 0, "hash", Some(cancel)).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(graph.node(&b).unwrap().operation.status, OperationStatus::Pending);
    }
}
