//! Orphan detection (§4.1 "Orphan detection")

use crate::config::EngineConfig;
use crate::model::{DiffResult, ObjectType, OperationType, ResourceState, Row};
use std::collections::{HashMap, HashSet};

/// An orphan found in `current_resources` with no matching desired row.
#[derive(Debug, Clone)]
pub struct OrphanCandidate {
    /// The server-side resource id that has no counterpart in the CSV
    pub resource_id: i64,
    /// ORPHAN (or NOOP, under safe mode) disposition for this resource
    pub diff: DiffResult,
}

/// Type-dependent natural key for a desired row (§4.1 `unique_key`).
fn unique_key_for_row(row: &Row) -> Option<String> {
    let typed_key = match row.object_type {
        ObjectType::Ip4Address | ObjectType::Ip6Address => {
            row.attr_str("address").map(|v| format!("address:{v}"))
        }
        ObjectType::Ip4Block | ObjectType::Ip4Network | ObjectType::Ip6Block | ObjectType::Ip6Network => {
            row.attr_str("cidr").map(|v| format!("cidr:{v}"))
        }
        ObjectType::DnsZone => row.attr_str("zone_name").map(|v| format!("name:{v}")),
        ObjectType::HostRecord
        | ObjectType::AliasRecord
        | ObjectType::MxRecord
        | ObjectType::TxtRecord
        | ObjectType::SrvRecord
        | ObjectType::ExternalHostRecord
        | ObjectType::GenericRecord => row.attr_str("name").map(|v| format!("name:{v}")),
        _ => None,
    };
    typed_key.or_else(|| row.bam_id.map(|id| format!("id:{id}")))
}

/// Type-dependent natural key for a current server resource, mirroring
/// [`unique_key_for_row`] against `ResourceState.r#type`'s string vocabulary.
fn unique_key_for_resource(resource: &ResourceState) -> Option<String> {
    let typed_key = match resource.r#type.as_str() {
        "ip4_address" | "ip6_address" => resource.property("address").map(|v| format!("address:{v}")),
        "ip4_block" | "ip4_network" | "ip6_block" | "ip6_network" => {
            resource.property("cidr").map(|v| format!("cidr:{v}"))
        }
        "dns_zone" => resource.property("zone_name").map(|v| format!("name:{v}")),
        "host_record" | "alias_record" | "mx_record" | "txt_record" | "srv_record"
        | "external_host_record" | "generic_record" => {
            resource.property("name").map(|v| format!("name:{v}"))
        }
        _ => None,
    };
    typed_key.or_else(|| Some(format!("id:{}", resource.id)))
}

/// Scan `current_resources` for resources absent from `desired_rows`.
///
/// Per §4.1's safety rule, the caller is responsible for having already
/// restricted `current_resources` to the exact containers the CSV defines;
/// this function never widens that scope itself. `scope` is only carried
/// into the emitted metadata for the caller's own bookkeeping.
pub fn detect_orphans(
    desired_rows: &[Row],
    current_resources: &[ResourceState],
    scope: &str,
    config: &EngineConfig,
) -> Vec<OrphanCandidate> {
    if !config.enable_orphan_detection {
        return Vec::new();
    }

    let desired_ids: HashSet<i64> = desired_rows.iter().filter_map(|r| r.bam_id).collect();
    let desired_keys: HashSet<String> = desired_rows.iter().filter_map(unique_key_for_row).collect();

    let mut out = Vec::new();
    for resource in current_resources {
        if desired_ids.contains(&resource.id) {
            continue;
        }
        if let Some(key) = unique_key_for_resource(resource) {
            if desired_keys.contains(&key) {
                continue;
            }
        }

        let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();
        metadata.insert("scope".to_string(), serde_json::Value::String(scope.to_string()));
        if let Some(name) = resource.property("name") {
            metadata.insert("name".to_string(), serde_json::Value::String(name.to_string()));
        }
        if let Some(address) = resource.property("address") {
            metadata.insert("address".to_string(), serde_json::Value::String(address.to_string()));
        }
        if let Some(cidr) = resource.property("cidr") {
            metadata.insert("cidr".to_string(), serde_json::Value::String(cidr.to_string()));
        }

        let mut diff = DiffResult {
            operation_type: OperationType::Orphan,
            resource_id: Some(resource.id),
            field_changes: HashMap::new(),
            conflict_detected: false,
            conflict_reason: None,
            metadata,
        };

        if config.safe_mode {
            diff.operation_type = OperationType::Noop;
            diff.metadata
                .insert("orphan_safe_mode".to_string(), serde_json::Value::Bool(true));
        }

        out.push(OrphanCandidate {
            resource_id: resource.id,
            diff,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrValue, RowAction, RowId};
    use std::collections::HashMap as Map;

    fn row(object_type: ObjectType, addr: &str) -> Row {
        let mut attributes = Map::new();
        attributes.insert("address".to_string(), AttrValue::Str(addr.to_string()));
        Row {
            row_id: RowId::Int(1),
            object_type,
            action: RowAction::Create,
            bam_id: None,
            attributes,
        }
    }

    fn resource(id: i64, r#type: &str, addr: &str) -> ResourceState {
        let mut properties = Map::new();
        properties.insert("address".to_string(), AttrValue::Str(addr.to_string()));
        ResourceState {
            id,
            r#type: r#type.to_string(),
            properties,
        }
    }

    #[test]
    fn matching_natural_key_is_not_an_orphan() {
        let desired = vec![row(ObjectType::Ip4Address, "10.1.0.5")];
        let current = vec![resource(100, "ip4_address", "10.1.0.5")];
        let config = EngineConfig::default();
        let orphans = detect_orphans(&desired, &current, "Default", &config);
        assert!(orphans.is_empty());
    }

    #[test]
    fn unmatched_resource_is_an_orphan() {
        let desired = vec![row(ObjectType::Ip4Address, "10.1.0.5")];
        let current = vec![
            resource(100, "ip4_address", "10.1.0.5"),
            resource(101, "ip4_address", "10.1.0.6"),
        ];
        let config = EngineConfig::default();
        let orphans = detect_orphans(&desired, &current, "Default", &config);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].resource_id, 101);
        assert_eq!(orphans[0].diff.operation_type, OperationType::Orphan);
    }

    #[test]
    fn safe_mode_downgrades_orphan_to_noop() {
        let desired = vec![];
        let current = vec![resource(101, "ip4_address", "10.1.0.6")];
        let mut config = EngineConfig::default();
        config.safe_mode = true;
        let orphans = detect_orphans(&desired, &current, "Default", &config);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].diff.operation_type, OperationType::Noop);
        assert_eq!(
            orphans[0].diff.metadata.get("orphan_safe_mode"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[test]
    fn disabled_orphan_detection_returns_empty() {
        let desired = vec![];
        let current = vec![resource(101, "ip4_address", "10.1.0.6")];
        let mut config = EngineConfig::default();
        config.enable_orphan_detection = false;
        let orphans = detect_orphans(&desired, &current, "Default", &config);
        assert!(orphans.is_empty());
    }
}
