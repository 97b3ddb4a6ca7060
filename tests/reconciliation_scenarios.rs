//! End-to-end pipeline scenarios (§8 "Concrete end-to-end scenarios"):
//! diff -> graph -> plan -> execute, driven against an in-memory fake
//! `IpamClient`. Mirrors S1, S5, and S6 from the specification; S2-S4 are
//! exercised at the unit level alongside the diff engine and path-matching
//! modules they belong to.

use async_trait::async_trait;
use ipam_reconcile_engine::collaborators::{ClientError, IpamClient, NaturalKey, ResourceId};
use ipam_reconcile_engine::config::EngineConfig;
use ipam_reconcile_engine::executor::Executor;
use ipam_reconcile_engine::graph::build_from_operations;
use ipam_reconcile_engine::model::{
    AttrValue, ObjectType, Operation, OperationStatus, OperationType, Payload, Row, RowAction, RowId,
};
use ipam_reconcile_engine::persistence::{CheckpointStatus, NewCheckpoint, PersistenceStore};
use ipam_reconcile_engine::planner::ExecutionPlanner;
use ipam_reconcile_engine::resolver::CreatedResourceMaps;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A scripted `IpamClient`: hands out sequential ids, records every call it
/// receives, and can be told to fail CREATE for one specific CIDR.
struct FakeClient {
    next_id: AtomicI64,
    calls: Mutex<Vec<String>>,
    fail_cidr: Option<String>,
}

impl FakeClient {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            calls: Mutex::new(Vec::new()),
            fail_cidr: None,
        }
    }

    fn failing(mut self, cidr: &str) -> Self {
        self.fail_cidr = Some(cidr.to_string());
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl IpamClient for FakeClient {
    async fn create(&self, object_type: ObjectType, payload: &Payload) -> Result<ResourceId, ClientError> {
        self.calls.lock().push(format!("create:{object_type}"));
        let cidr = payload.get("cidr").and_then(|v| v.as_str());
        if let (Some(fail), Some(cidr)) = (&self.fail_cidr, cidr) {
            if fail == cidr {
                return Err(ClientError::Server("synthetic server error".to_string()));
            }
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn update(&self, _id: ResourceId, object_type: ObjectType, _payload: &Payload) -> Result<(), ClientError> {
        self.calls.lock().push(format!("update:{object_type}"));
        Ok(())
    }

    async fn delete(&self, _id: ResourceId, object_type: ObjectType, _allow_dangerous: bool) -> Result<(), ClientError> {
        self.calls.lock().push(format!("delete:{object_type}"));
        Ok(())
    }

    async fn find_by_natural_key(
        &self,
        object_type: ObjectType,
        _natural_key: &NaturalKey,
    ) -> Result<Option<ResourceId>, ClientError> {
        self.calls.lock().push(format!("find:{object_type}"));
        Ok(None)
    }
}

fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, AttrValue> {
    pairs.iter().map(|(k, v)| (k.to_string(), AttrValue::Str(v.to_string()))).collect()
}

fn payload(pairs: &[(&str, &str)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

fn block_create(row_id: i64, cidr: &str) -> Operation {
    let attributes = attrs(&[("cidr", cidr), ("config", "Default")]);
    Operation {
        object_type: ObjectType::Ip4Block,
        row_id: RowId::Int(row_id),
        operation_type: OperationType::Create,
        resource_id: None,
        payload: payload(&[("cidr", cidr)]),
        csv_row: Row {
            row_id: RowId::Int(row_id),
            object_type: ObjectType::Ip4Block,
            action: RowAction::Create,
            bam_id: None,
            attributes,
        },
        status: OperationStatus::Pending,
        error_message: None,
    }
}

fn network_create(row_id: i64, cidr: &str, block_cidr: &str) -> Operation {
    let parent = format!("Default/{block_cidr}");
    let attributes = attrs(&[("cidr", cidr), ("config", "Default"), ("parent", &parent)]);
    let mut p = payload(&[("cidr", cidr)]);
    p.insert(
        "_deferred_block_cidr".to_string(),
        serde_json::Value::String(block_cidr.to_string()),
    );
    Operation {
        object_type: ObjectType::Ip4Network,
        row_id: RowId::Int(row_id),
        operation_type: OperationType::Create,
        resource_id: None,
        payload: p,
        csv_row: Row {
            row_id: RowId::Int(row_id),
            object_type: ObjectType::Ip4Network,
            action: RowAction::Create,
            bam_id: None,
            attributes,
        },
        status: OperationStatus::Pending,
        error_message: None,
    }
}

fn address_create(row_id: i64, address: &str, network_cidr: &str, block_cidr: &str) -> Operation {
    let parent = format!("Default/{block_cidr}/{network_cidr}");
    let attributes = attrs(&[("address", address), ("config", "Default"), ("parent", &parent)]);
    let mut p = payload(&[("address", address)]);
    p.insert(
        "_deferred_network_cidr".to_string(),
        serde_json::Value::String(network_cidr.to_string()),
    );
    Operation {
        object_type: ObjectType::Ip4Address,
        row_id: RowId::Int(row_id),
        operation_type: OperationType::Create,
        resource_id: None,
        payload: p,
        csv_row: Row {
            row_id: RowId::Int(row_id),
            object_type: ObjectType::Ip4Address,
            action: RowAction::Create,
            bam_id: None,
            attributes,
        },
        status: OperationStatus::Pending,
        error_message: None,
    }
}

/// S1: block, network, address happy path. Three strictly increasing
/// depths; every operation SUCCEEDED with an assigned server id.
#[tokio::test]
async fn s1_block_network_address_happy_path() {
    let operations = vec![
        block_create(1, "10.0.0.0/8"),
        network_create(2, "10.1.0.0/24", "10.0.0.0/8"),
        address_create(3, "10.1.0.10", "10.1.0.0/24", "10.0.0.0/8"),
    ];
    let mut graph = build_from_operations(operations).unwrap();

    let config = EngineConfig::default();
    let plan = ExecutionPlanner::new(&config).plan(&mut graph).unwrap();

    let client = Arc::new(FakeClient::new());
    let executor = Executor::new(config, client.clone(), "s1");
    let summary = executor
        .execute_plan(&mut graph, &plan, false, 0, "hash", None)
        .await
        .unwrap();

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.succeeded, 3);

    let block_depth = graph.node("ip4_block:1").unwrap().depth;
    let network_depth = graph.node("ip4_network:2").unwrap().depth;
    let address_depth = graph.node("ip4_address:3").unwrap().depth;
    assert!(block_depth < network_depth);
    assert!(network_depth < address_depth);

    for id in ["ip4_block:1", "ip4_network:2", "ip4_address:3"] {
        let node = graph.node(id).unwrap();
        assert_eq!(node.operation.status, OperationStatus::Succeeded);
        assert!(node.operation.resource_id.is_some());
    }
}

/// S5: a failed block CREATE cascades a SKIPPED to its network and address
/// dependents; the server only ever sees the one (failing) block CREATE
/// call.
#[tokio::test]
async fn s5_cascading_failure_skips_dependents_and_calls_server_once() {
    let operations = vec![
        block_create(1, "10.0.0.0/8"),
        network_create(2, "10.1.0.0/24", "10.0.0.0/8"),
        address_create(3, "10.1.0.10", "10.1.0.0/24", "10.0.0.0/8"),
    ];
    let mut graph = build_from_operations(operations).unwrap();

    let config = EngineConfig::default();
    let plan = ExecutionPlanner::new(&config).plan(&mut graph).unwrap();

    let client = Arc::new(FakeClient::new().failing("10.0.0.0/8"));
    let executor = Executor::new(config, client.clone(), "s5");
    let summary = executor
        .execute_plan(&mut graph, &plan, false, 0, "hash", None)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(graph.node("ip4_block:1").unwrap().operation.status, OperationStatus::Failed);
    assert_eq!(graph.node("ip4_network:2").unwrap().operation.status, OperationStatus::Skipped);
    assert_eq!(graph.node("ip4_address:3").unwrap().operation.status, OperationStatus::Skipped);

    // Only the block's own CREATE ever reached the server; the skipped
    // network/address never dispatched at all.
    assert_eq!(client.call_count(), 1);
}

/// S6: a session interrupted after the block+network batches resumes
/// without re-contacting the server for either of them, and without the
/// deferred network-cidr marker on the address operation ever calling
/// `find_by_natural_key` (it resolves from the preloaded created-resource
/// map instead).
#[tokio::test]
async fn s6_resume_skips_completed_batches_and_resolves_from_checkpoint() {
    let operations = vec![
        block_create(1, "10.0.0.0/8"),
        network_create(2, "10.1.0.0/24", "10.0.0.0/8"),
        address_create(3, "10.1.0.10", "10.1.0.0/24", "10.0.0.0/8"),
    ];
    let mut graph = build_from_operations(operations).unwrap();

    let config = EngineConfig::default();
    let plan = ExecutionPlanner::new(&config).plan(&mut graph).unwrap();

    let network_batch_id = plan
        .batches
        .iter()
        .find(|b| b.operations.iter().any(|id| id == "ip4_network:2"))
        .unwrap()
        .batch_id;

    let store = Arc::new(PersistenceStore::in_memory().unwrap());
    store
        .save_checkpoint(NewCheckpoint {
            session_id: "s6".to_string(),
            batch_id: network_batch_id,
            operation_index: 1,
            completed_operations: 2,
            total_operations: plan.total_operations,
            status: CheckpointStatus::InProgress,
            input_hash: "abc123".to_string(),
            metadata: None,
        })
        .unwrap();
    store.save_created_resource("s6", "block", "10.0.0.0/8", 1).unwrap();
    store.save_created_resource("s6", "network", "10.1.0.0/24", 2).unwrap();

    let mut maps = CreatedResourceMaps::default();
    maps.blocks.insert("10.0.0.0/8".to_string(), 1);
    maps.networks.insert("10.1.0.0/24".to_string(), 2);

    let client = Arc::new(FakeClient::new());
    let executor = Executor::new(config, client.clone(), "s6").with_persistence(store.clone());
    executor.resume_created_resources(maps).await;

    let resumable = store.find_resumable_session("s6", "abc123").unwrap().unwrap();
    let summary = executor
        .execute_plan(
            &mut graph,
            &plan,
            false,
            resumable.batch_id + 1,
            "abc123",
            None,
        )
        .await
        .unwrap();

    // Only the address (and any barrier NOOPs past the resume point) ran.
    assert_eq!(summary.failed, 0);
    assert_eq!(graph.node("ip4_address:3").unwrap().operation.status, OperationStatus::Succeeded);
    // The block/network batches were skipped outright: never touched.
    assert_eq!(graph.node("ip4_block:1").unwrap().operation.status, OperationStatus::Pending);
    assert_eq!(graph.node("ip4_network:2").unwrap().operation.status, OperationStatus::Pending);

    // No CREATE call for the block or network; the address's deferred
    // `_deferred_network_cidr` marker resolved from the preloaded map, never
    // falling back to `find_by_natural_key`.
    let calls = client.calls.lock();
    assert!(calls.iter().all(|c| c != "create:ip4_block"));
    assert!(calls.iter().all(|c| c != "create:ip4_network"));
    assert!(calls.iter().any(|c| c == "create:ip4_address"));
    assert!(calls.iter().all(|c| !c.starts_with("find:")));
}
