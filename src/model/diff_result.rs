//! Output of the diff engine for a single row

use super::field_change::FieldChange;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The five dispositions a row can resolve to (§3 `Operation.operation_type`,
/// reused here since the diff engine's output classification and the
/// operation's eventual classification are the same enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    Noop,
    Orphan,
}

/// The result of reconciling one desired row against current server state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    /// What the engine decided to do
    pub operation_type: OperationType,
    /// Target resource id, when known (present for UPDATE/DELETE/NOOP-exists)
    pub resource_id: Option<i64>,
    /// Minimal set of fields that differ, keyed by field name
    pub field_changes: HashMap<String, FieldChange>,
    /// Set when policy intentionally declined to reconcile a mismatch
    /// (e.g. `strict` mode against a missing resource)
    pub conflict_detected: bool,
    /// Human-readable reason when `conflict_detected` is true
    pub conflict_reason: Option<String>,
    /// Free-form annotations: `already_exists`, `safe_mode_prevented_delete`,
    /// `orphan_safe_mode`, orphan identity fields, etc.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DiffResult {
    /// Build a bare NOOP result with a human-readable reason recorded in metadata.
    pub fn noop(reason: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("reason".to_string(), serde_json::Value::String(reason.to_string()));
        Self {
            operation_type: OperationType::Noop,
            resource_id: None,
            field_changes: HashMap::new(),
            conflict_detected: false,
            conflict_reason: None,
            metadata,
        }
    }

    /// Build a NOOP result that also records `conflict_detected = true`.
    pub fn conflict(reason: &str) -> Self {
        let mut r = Self::noop(reason);
        r.conflict_detected = true;
        r.conflict_reason = Some(reason.to_string());
        r
    }
}
