//! Deferred reference resolution (§4.4)

use crate::error::{EngineError, EngineResult};
use crate::model::{DeferredRef, ObjectType, Operation};
use serde_json::Value;
use std::collections::HashMap;

/// In-memory maps of resources created so far this session, keyed by their
/// type-specific natural key (§4.6.3, §3 "CreatedResource").
///
/// Lives behind `Arc<tokio::sync::RwLock<_>>` in the executor: read-locked by
/// the resolver before each dispatch, write-locked only on the executor's own
/// success path (§5 "Shared-resource policy").
#[derive(Debug, Clone, Default)]
pub struct CreatedResourceMaps {
    pub blocks: HashMap<String, i64>,
    pub networks: HashMap<String, i64>,
    pub zones: HashMap<String, i64>,
    pub locations: HashMap<String, i64>,
    pub device_types: HashMap<String, i64>,
    pub device_subtypes: HashMap<String, i64>,
    pub devices: HashMap<String, i64>,
}

impl CreatedResourceMaps {
    /// Record a newly created resource under its natural key.
    pub fn record(&mut self, resource_type: &str, key: &str, id: i64) {
        let map = match resource_type {
            "block" => &mut self.blocks,
            "network" => &mut self.networks,
            "zone" => &mut self.zones,
            "location" => &mut self.locations,
            "device_type" => &mut self.device_types,
            "device_subtype" => &mut self.device_subtypes,
            "device" => &mut self.devices,
            other => {
                tracing::warn!(resource_type = other, "unrecognized created-resource type ignored");
                return;
            }
        };
        map.insert(key.to_string(), id);
    }
}

/// Resolve every `DeferredRef` on `operation`'s working payload against
/// `maps`, returning the resolved payload. `operation.payload` itself (the
/// original) is left untouched by the caller — this function takes an
/// already-deep-copied payload to mutate, preserving §4.4's retry-idempotence
/// contract ("the original payload retains its deferred markers until the
/// attempt succeeds").
pub fn resolve_deferred(
    operation: &Operation,
    working_payload: &mut HashMap<String, Value>,
    maps: &CreatedResourceMaps,
) -> EngineResult<()> {
    for deferred in operation.deferred_refs() {
        let resolved_id = lookup(&deferred, operation, maps)?;
        apply_resolution(&deferred, operation.object_type, resolved_id, working_payload);
        for key in deferred.payload_keys() {
            working_payload.remove(key);
        }
    }
    Ok(())
}

fn lookup(deferred: &DeferredRef, operation: &Operation, maps: &CreatedResourceMaps) -> EngineResult<i64> {
    let (map, resource_type, deferred_key, deferred_value): (&HashMap<String, i64>, &str, &str, String) =
        match deferred {
            DeferredRef::BlockCidr(cidr) => (&maps.blocks, "block", "_deferred_block_cidr", cidr.clone()),
            DeferredRef::NetworkCidr(cidr) => {
                (&maps.networks, "network", "_deferred_network_cidr", cidr.clone())
            }
            DeferredRef::ZoneName(name) => (&maps.zones, "zone", "_deferred_zone_name", name.clone()),
            DeferredRef::LocationCode(code) => {
                (&maps.locations, "location", "_deferred_location_code", code.clone())
            }
            DeferredRef::DeviceTypeName(name) => (
                &maps.device_types,
                "device_type",
                "_deferred_device_type_name",
                name.clone(),
            ),
            DeferredRef::DeviceSubtypeName(name) => (
                &maps.device_subtypes,
                "device_subtype",
                "_deferred_device_subtype_name",
                name.clone(),
            ),
            DeferredRef::Device { config, name } => {
                let key = device_key(config.as_deref(), name);
                return maps
                    .devices
                    .get(&key)
                    .copied()
                    .or_else(|| maps.devices.get(name).copied())
                    .ok_or_else(|| EngineError::DeferredResolution {
                        row_id: operation.row_id.to_string(),
                        resource_type: "device".to_string(),
                        deferred_key: "_deferred_device_name".to_string(),
                        deferred_value: key,
                    });
            }
        };

    map.get(&deferred_value).copied().ok_or_else(|| EngineError::DeferredResolution {
        row_id: operation.row_id.to_string(),
        resource_type: resource_type.to_string(),
        deferred_key: deferred_key.to_string(),
        deferred_value,
    })
}

fn device_key(config: Option<&str>, name: &str) -> String {
    match config {
        Some(c) => format!("{c}/{name}"),
        None => name.to_string(),
    }
}

/// Write the resolved id into `working_payload` per §4.4's marker table.
/// `_deferred_location_code` is special-cased: targets that are themselves a
/// `location` get `parent_location_id`, everything else gets `location = {id}`.
fn apply_resolution(
    deferred: &DeferredRef,
    target_type: ObjectType,
    resolved_id: i64,
    working_payload: &mut HashMap<String, Value>,
) {
    let field = match deferred {
        DeferredRef::BlockCidr(_) => "block_id",
        DeferredRef::NetworkCidr(_) => "network_id",
        DeferredRef::ZoneName(_) => "zone_id",
        DeferredRef::LocationCode(_) => {
            if target_type == ObjectType::Location {
                "parent_location_id"
            } else {
                "location"
            }
        }
        DeferredRef::DeviceTypeName(_) => "device_type_id",
        DeferredRef::DeviceSubtypeName(_) => "device_subtype_id",
        DeferredRef::Device { .. } => "device_id",
    };

    let value = if matches!(deferred, DeferredRef::LocationCode(_)) && target_type != ObjectType::Location {
        let mut obj = serde_json::Map::new();
        obj.insert("id".to_string(), Value::from(resolved_id));
        Value::Object(obj)
    } else {
        Value::from(resolved_id)
    };
    working_payload.insert(field.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OperationStatus, OperationType, Row, RowAction, RowId};

    fn operation_with_marker(key: &str, value: &str, object_type: ObjectType) -> Operation {
        let mut payload = HashMap::new();
        payload.insert(key.to_string(), Value::String(value.to_string()));
        Operation {
            object_type,
            row_id: RowId::Int(1),
            operation_type: OperationType::Create,
            resource_id: None,
            payload,
            csv_row: Row {
                row_id: RowId::Int(1),
                object_type,
                action: RowAction::Create,
                bam_id: None,
                attributes: HashMap::new(),
            },
            status: OperationStatus::Pending,
            error_message: None,
        }
    }

    #[test]
    fn resolves_block_cidr_marker_and_strips_it() {
        let op = operation_with_marker("_deferred_block_cidr", "10.0.0.0/8", ObjectType::Ip4Network);
        let mut maps = CreatedResourceMaps::default();
        maps.blocks.insert("10.0.0.0/8".to_string(), 42);
        let mut working = op.payload.clone();
        resolve_deferred(&op, &mut working, &maps).unwrap();
        assert_eq!(working.get("block_id"), Some(&Value::from(42)));
        assert!(!working.contains_key("_deferred_block_cidr"));
        // original payload is untouched
        assert!(op.payload.contains_key("_deferred_block_cidr"));
    }

    #[test]
    fn missing_marker_value_fails_fast() {
        let op = operation_with_marker("_deferred_network_cidr", "10.1.0.0/24", ObjectType::Ip4Address);
        let maps = CreatedResourceMaps::default();
        let mut working = op.payload.clone();
        let err = resolve_deferred(&op, &mut working, &maps).unwrap_err();
        assert!(matches!(err, EngineError::DeferredResolution { .. }));
    }

    #[test]
    fn location_code_on_location_target_resolves_to_parent_location_id() {
        let op = operation_with_marker("_deferred_location_code", "USA-CA", ObjectType::Location);
        let mut maps = CreatedResourceMaps::default();
        maps.locations.insert("USA-CA".to_string(), 7);
        let mut working = op.payload.clone();
        resolve_deferred(&op, &mut working, &maps).unwrap();
        assert_eq!(working.get("parent_location_id"), Some(&Value::from(7)));
    }

    #[test]
    fn location_code_on_non_location_target_resolves_to_location_object() {
        let op = operation_with_marker("_deferred_location_code", "USA-CA", ObjectType::Device);
        let mut maps = CreatedResourceMaps::default();
        maps.locations.insert("USA-CA".to_string(), 7);
        let mut working = op.payload.clone();
        resolve_deferred(&op, &mut working, &maps).unwrap();
        let value = working.get("location").unwrap();
        assert_eq!(value.get("id"), Some(&Value::from(7)));
    }

    #[test]
    fn device_marker_falls_back_to_bare_name_key() {
        let mut payload = HashMap::new();
        payload.insert("_deferred_device_name".to_string(), Value::String("sw1".to_string()));
        let op = Operation {
            object_type: ObjectType::DeviceAddress,
            row_id: RowId::Int(1),
            operation_type: OperationType::Create,
            resource_id: None,
            payload,
            csv_row: Row {
                row_id: RowId::Int(1),
                object_type: ObjectType::DeviceAddress,
                action: RowAction::Create,
                bam_id: None,
                attributes: HashMap::new(),
            },
            status: OperationStatus::Pending,
            error_message: None,
        };
        let mut maps = CreatedResourceMaps::default();
        maps.devices.insert("sw1".to_string(), 9);
        let mut working = op.payload.clone();
        resolve_deferred(&op, &mut working, &maps).unwrap();
        assert_eq!(working.get("device_id"), Some(&Value::from(9)));
    }
}
