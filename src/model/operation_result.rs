//! Per-operation dispatch outcome (§4.6, §7 "User-visible failure behavior")

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The result of attempting to dispatch one operation. Distinct from
/// [`crate::model::Operation::status`]: the status lives on the graph node
/// for the lifetime of the run, while this is the value surfaced to the
/// caller of `execute_plan` (one per attempted operation, including SKIPPED
/// ones that were never dispatched).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// `"{object_type}:{row_id}"`, matching the graph node id
    pub node_id: String,
    /// `false` for FAILED and SKIPPED outcomes alike
    pub success: bool,
    /// Present on a successful CREATE (new or already-existing)
    pub resource_id: Option<i64>,
    /// Human-readable failure reason; absent on success
    pub error_message: Option<String>,
    /// Wall-clock time spent in the handler call, in milliseconds; `0` for
    /// operations that were never dispatched (SKIPPED, pre-existing error)
    pub latency_ms: u64,
    /// Free-form annotations: `skipped`, `already_exists`, `traceback`, etc.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OperationResult {
    /// Build a SKIPPED result (§4.6.2 cascade).
    pub fn skipped(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("skipped".to_string(), serde_json::Value::Bool(true));
        Self {
            node_id: node_id.into(),
            success: false,
            resource_id: None,
            error_message: Some(reason.into()),
            latency_ms: 0,
            metadata,
        }
    }
}
