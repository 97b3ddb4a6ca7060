//! The diff engine (§4.1): reconciles one desired row against current state

use super::normalize::{normalize, normalized_eq};
use crate::config::{EngineConfig, UpdateMode};
use crate::error::{EngineError, EngineResult};
use crate::model::{DiffResult, FieldChange, OperationType, ResourceState, Row, RowAction, RESERVED_FIELDS};
use std::collections::HashMap;

/// Stateless reconciler for one `(row, current_state)` pair at a time.
/// Holds only the policy surface (§4.1); all per-row data is passed in.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    update_mode: UpdateMode,
    safe_mode: bool,
}

impl DiffEngine {
    /// Build a diff engine from the shared engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            update_mode: config.update_mode,
            safe_mode: config.safe_mode,
        }
    }

    /// Reconcile `row` against `current`, producing the disposition the
    /// executor will act on.
    pub fn diff(&self, row: &Row, current: Option<&ResourceState>) -> EngineResult<DiffResult> {
        match row.action {
            RowAction::Create => Ok(self.diff_create(row, current)),
            RowAction::Update => Ok(self.diff_update(row, current)),
            RowAction::Delete => Ok(self.diff_delete(row, current)),
        }
    }

    fn diff_create(&self, row: &Row, current: Option<&ResourceState>) -> DiffResult {
        let Some(current) = current else {
            return DiffResult {
                operation_type: OperationType::Create,
                resource_id: None,
                field_changes: HashMap::new(),
                conflict_detected: false,
                conflict_reason: None,
                metadata: HashMap::new(),
            };
        };

        if self.update_mode == UpdateMode::CreateOnly {
            return DiffResult::noop("already exists");
        }

        self.diff_against_existing(row, current)
    }

    fn diff_update(&self, row: &Row, current: Option<&ResourceState>) -> DiffResult {
        let Some(current) = current else {
            return match self.update_mode {
                UpdateMode::Upsert => DiffResult {
                    operation_type: OperationType::Create,
                    resource_id: None,
                    field_changes: HashMap::new(),
                    conflict_detected: false,
                    conflict_reason: None,
                    metadata: {
                        let mut m = HashMap::new();
                        m.insert("reason".to_string(), serde_json::Value::String("upsert".to_string()));
                        m
                    },
                },
                // CreateOnly never reaches here for an `update` action in
                // practice, but falls back to the same strict handling as a
                // safe default rather than silently creating unrequested rows.
                UpdateMode::Strict | UpdateMode::CreateOnly => DiffResult::conflict(
                    "update requested for a resource that does not exist (strict mode)",
                ),
            };
        };

        self.diff_against_existing(row, current)
    }

    fn diff_delete(&self, _row: &Row, current: Option<&ResourceState>) -> DiffResult {
        let Some(current) = current else {
            return DiffResult::noop("already gone");
        };

        if self.safe_mode {
            let mut result = DiffResult::noop("safe mode prevents delete");
            result
                .metadata
                .insert("safe_mode_prevented_delete".to_string(), serde_json::Value::Bool(true));
            return result;
        }

        DiffResult {
            operation_type: OperationType::Delete,
            resource_id: Some(current.id),
            field_changes: HashMap::new(),
            conflict_detected: false,
            conflict_reason: None,
            metadata: HashMap::new(),
        }
    }

    /// Shared CREATE/UPDATE convergence path: compute field changes and
    /// decide UPDATE vs NOOP.
    fn diff_against_existing(&self, row: &Row, current: &ResourceState) -> DiffResult {
        let field_changes = compute_field_changes(row, current);
        if field_changes.is_empty() {
            let mut result = DiffResult::noop("no effective changes");
            result.resource_id = Some(current.id);
            return result;
        }
        DiffResult {
            operation_type: OperationType::Update,
            resource_id: Some(current.id),
            field_changes,
            conflict_detected: false,
            conflict_reason: None,
            metadata: HashMap::new(),
        }
    }
}

/// Compute the minimal field-change set between a desired row and current
/// server state (§4.1 "Field-change computation").
pub fn compute_field_changes(row: &Row, current: &ResourceState) -> HashMap<String, FieldChange> {
    let mut changes = HashMap::new();
    for (field_name, desired) in &row.attributes {
        if RESERVED_FIELDS.contains(&field_name.as_str()) {
            continue;
        }
        if desired.is_null() {
            continue;
        }
        let existing = current.properties.get(field_name);
        if !normalized_eq(Some(desired), existing) {
            changes.insert(
                field_name.clone(),
                FieldChange {
                    field_name: field_name.clone(),
                    old_value: existing.map(normalize),
                    new_value: Some(normalize(desired)),
                },
            );
        }
    }
    changes
}

/// Validate that a row's action is one of the three recognized values.
/// Present for symmetry with the source system's explicit action-routing
/// validation; in this crate `RowAction` is already a closed enum so invalid
/// actions cannot be represented, but external deserialization (e.g. from
/// JSON over a wire boundary) can still surface this as a `Validation` error.
pub fn validate_action(raw: &str) -> EngineResult<RowAction> {
    match raw {
        "create" => Ok(RowAction::Create),
        "update" => Ok(RowAction::Update),
        "delete" => Ok(RowAction::Delete),
        other => Err(EngineError::Validation(format!("unknown action: {other}"))),
    }
}
