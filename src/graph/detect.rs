//! Automatic dependency detection from a batch of operations (§4.2 steps 1-3)

use super::dag::DependencyGraph;
use super::node::EdgeKind;
use super::path::{cidr_in_path, is_child_of};
use super::phases::{phase_of, PHASE_COUNT};
use crate::error::EngineResult;
use crate::model::{ObjectType, Operation, OperationStatus, OperationType, Row, RowAction, RowId};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Build a synthetic `system_barrier` NOOP operation for `phase`. `seq` keeps
/// barrier row ids unique across the (possibly two, delete + create/update)
/// barrier chains built for the same phase number.
pub fn barrier_operation(phase: usize, seq: u64) -> Operation {
    Operation {
        object_type: ObjectType::SystemBarrier,
        row_id: RowId::Str(format!("phase{phase}-barrier{seq}")),
        operation_type: OperationType::Noop,
        resource_id: None,
        payload: HashMap::new(),
        csv_row: Row {
            row_id: RowId::Str(format!("phase{phase}-barrier{seq}")),
            object_type: ObjectType::SystemBarrier,
            action: RowAction::Create,
            bam_id: None,
            attributes: HashMap::new(),
        },
        status: OperationStatus::Pending,
        error_message: None,
    }
}

fn path_attr(row: &Row) -> Option<&str> {
    row.attr_str("parent").or_else(|| row.attr_str("config"))
}

/// Build a dependency graph from a flat batch of operations: add every
/// operation as a node, auto-detect edges (§4.2.1-§4.2.4), inject phase
/// barriers (§4.2.5), then recompute depths.
pub fn build_from_operations(operations: Vec<Operation>) -> EngineResult<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    let mut node_ids: Vec<String> = Vec::with_capacity(operations.len());
    for operation in operations {
        node_ids.push(graph.add_node(operation));
    }

    detect_delete_child_edges(&mut graph, &node_ids)?;
    detect_create_update_edges(&mut graph, &node_ids)?;
    apply_phase_barriers(&mut graph, &node_ids)?;
    graph.recompute_depths()?;
    Ok(graph)
}

/// §4.2 step 2, DELETE branch: for every pair of DELETE operations where
/// `other`'s path is nested under `self`'s path, `self` (the parent) depends
/// on `other` (the child) so children are deleted first.
fn detect_delete_child_edges(graph: &mut DependencyGraph, node_ids: &[String]) -> EngineResult<()> {
    let delete_ids: Vec<&String> = node_ids
        .iter()
        .filter(|id| graph.node(id).map(|n| n.operation.operation_type == OperationType::Delete).unwrap_or(false))
        .collect();

    for &self_id in &delete_ids {
        let Some(self_path) = path_attr(&graph.node(self_id).unwrap().operation.csv_row).map(str::to_string) else {
            continue;
        };
        for &other_id in &delete_ids {
            if self_id == other_id {
                continue;
            }
            let Some(other_path) = path_attr(&graph.node(other_id).unwrap().operation.csv_row) else {
                continue;
            };
            if is_child_of(&self_path, other_path) {
                graph.add_dependency(self_id, other_id, EdgeKind::ParentChild)?;
            }
        }
    }
    Ok(())
}

/// §4.2 step 2, CREATE/UPDATE branch: parent-path resolution, path-based
/// CIDR/zone/network containment, and record-reference edges.
fn detect_create_update_edges(graph: &mut DependencyGraph, node_ids: &[String]) -> EngineResult<()> {
    let active: Vec<String> = node_ids
        .iter()
        .filter(|id| {
            graph
                .node(id)
                .map(|n| matches!(n.operation.operation_type, OperationType::Create | OperationType::Update))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    detect_cidr_containment(graph, &active, ObjectType::Ip4Network, ObjectType::Ip4Block)?;
    detect_cidr_containment(graph, &active, ObjectType::Ip6Network, ObjectType::Ip6Block)?;
    detect_cidr_containment(graph, &active, ObjectType::Ip4Address, ObjectType::Ip4Network)?;
    detect_cidr_containment(graph, &active, ObjectType::Ip6Address, ObjectType::Ip6Network)?;
    detect_dns_record_zone_edges(graph, &active)?;
    detect_dhcp_range_edges(graph, &active)?;
    detect_device_hierarchy_edges(graph, &active)?;
    detect_location_edges(graph, &active)?;
    detect_host_record_network_edges(graph, &active)?;
    detect_record_reference_edges(graph, &active)?;
    Ok(())
}

/// §4.2.3 first two bullets: a `child_type` operation depends on a
/// `container_type` operation in the same `config` whose `cidr` appears as a
/// whole-segment match inside the child's `parent` path.
fn detect_cidr_containment(
    graph: &mut DependencyGraph,
    active: &[String],
    child_type: ObjectType,
    container_type: ObjectType,
) -> EngineResult<()> {
    let containers: Vec<(String, String, String)> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            if row.object_type != container_type {
                return None;
            }
            let cidr = row.attr_str("cidr")?.to_string();
            let config = row.attr_str("config").unwrap_or_default().to_string();
            Some((id.clone(), config, cidr))
        })
        .collect();

    let children: Vec<String> = active
        .iter()
        .filter(|id| graph.node(id).unwrap().operation.csv_row.object_type == child_type)
        .cloned()
        .collect();

    for child_id in &children {
        let (child_config, child_path) = {
            let row = &graph.node(child_id).unwrap().operation.csv_row;
            (
                row.attr_str("config").unwrap_or_default().to_string(),
                path_attr(row).map(str::to_string),
            )
        };
        let Some(child_path) = child_path else { continue };
        for (container_id, container_config, cidr) in &containers {
            if *container_config != child_config {
                continue;
            }
            if cidr_in_path(cidr, &child_path) {
                graph.add_dependency(child_id, container_id, EdgeKind::ParentChild)?;
            }
        }
    }
    Ok(())
}

const DNS_RECORD_TYPES: [ObjectType; 6] = [
    ObjectType::HostRecord,
    ObjectType::AliasRecord,
    ObjectType::MxRecord,
    ObjectType::TxtRecord,
    ObjectType::SrvRecord,
    ObjectType::ExternalHostRecord,
];

/// §4.2.3 third bullet: DNS records depend on the zone with matching
/// `(config, view_path, zone_name)`.
fn detect_dns_record_zone_edges(graph: &mut DependencyGraph, active: &[String]) -> EngineResult<()> {
    let zones: Vec<(String, String, String, String)> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            if row.object_type != ObjectType::DnsZone {
                return None;
            }
            Some((
                id.clone(),
                row.attr_str("config").unwrap_or_default().to_string(),
                row.attr_str("view_path").unwrap_or_default().to_string(),
                row.attr_str("zone_name")?.to_string(),
            ))
        })
        .collect();

    for record_id in active {
        let row = &graph.node(record_id).unwrap().operation.csv_row;
        if !DNS_RECORD_TYPES.contains(&row.object_type) {
            continue;
        }
        let config = row.attr_str("config").unwrap_or_default().to_string();
        let view_path = row.attr_str("view_path").unwrap_or_default().to_string();
        let Some(zone_name) = row.attr_str("zone_name").map(str::to_string) else {
            continue;
        };
        for (zone_id, zcfg, zview, zname) in &zones {
            if *zcfg == config && *zview == view_path && *zname == zone_name {
                graph.add_dependency(record_id, zone_id, EdgeKind::ParentChild)?;
            }
        }
    }
    Ok(())
}

/// §4.2.3 fourth bullet: a DHCP range depends on the network it targets,
/// identified either by a resolved `network_id` or a `_deferred_network_cidr`
/// marker matching a network operation's own `cidr`.
fn detect_dhcp_range_edges(graph: &mut DependencyGraph, active: &[String]) -> EngineResult<()> {
    let networks: Vec<(String, String)> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            if !matches!(row.object_type, ObjectType::Ip4Network | ObjectType::Ip6Network) {
                return None;
            }
            Some((id.clone(), row.attr_str("cidr")?.to_string()))
        })
        .collect();

    for range_id in active {
        let is_range = matches!(
            graph.node(range_id).unwrap().operation.csv_row.object_type,
            ObjectType::Ipv4DhcpRange | ObjectType::Ipv6DhcpRange
        );
        if !is_range {
            continue;
        }
        let deferred_cidr = graph
            .node(range_id)
            .unwrap()
            .operation
            .payload
            .get("_deferred_network_cidr")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let Some(cidr) = deferred_cidr else { continue };
        for (network_id, network_cidr) in &networks {
            if *network_cidr == cidr {
                graph.add_dependency(range_id, network_id, EdgeKind::Reference)?;
            }
        }
    }
    Ok(())
}

/// §4.2.3 fifth bullet: `device_subtype` depends on `device_type` by name;
/// `device` depends on both; `device_address` depends on the `device` with
/// matching `(config, name)`.
fn detect_device_hierarchy_edges(graph: &mut DependencyGraph, active: &[String]) -> EngineResult<()> {
    let device_types: HashMap<String, String> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            (row.object_type == ObjectType::DeviceType)
                .then(|| row.attr_str("name").map(|n| (n.to_string(), id.clone())))
                .flatten()
        })
        .collect();
    let device_subtypes: HashMap<String, String> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            (row.object_type == ObjectType::DeviceSubtype)
                .then(|| row.attr_str("name").map(|n| (n.to_string(), id.clone())))
                .flatten()
        })
        .collect();
    let devices: HashMap<(String, String), String> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            if row.object_type != ObjectType::Device {
                return None;
            }
            let config = row.attr_str("config").unwrap_or_default().to_string();
            let name = row.attr_str("name")?.to_string();
            Some(((config, name), id.clone()))
        })
        .collect();

    for id in active {
        let row = &graph.node(id).unwrap().operation.csv_row;
        match row.object_type {
            ObjectType::DeviceSubtype => {
                if let Some(type_name) = row.attr_str("device_type_name") {
                    if let Some(type_id) = device_types.get(type_name) {
                        graph.add_dependency(id, type_id, EdgeKind::Reference)?;
                    }
                }
            }
            ObjectType::Device => {
                if let Some(type_name) = row.attr_str("device_type_name") {
                    if let Some(type_id) = device_types.get(type_name) {
                        graph.add_dependency(id, type_id, EdgeKind::Reference)?;
                    }
                }
                if let Some(subtype_name) = row.attr_str("device_subtype_name") {
                    if let Some(subtype_id) = device_subtypes.get(subtype_name) {
                        graph.add_dependency(id, subtype_id, EdgeKind::Reference)?;
                    }
                }
            }
            ObjectType::DeviceAddress => {
                let config = row.attr_str("config").unwrap_or_default().to_string();
                if let Some(name) = row.attr_str("name") {
                    if let Some(device_id) = devices.get(&(config, name.to_string())) {
                        graph.add_dependency(id, device_id, EdgeKind::ParentChild)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// §4.2.3 sixth bullet: `location` depends on its parent `location` (from a
/// deferred code); any operation carrying `_deferred_location_code` depends
/// on the matching location.
fn detect_location_edges(graph: &mut DependencyGraph, active: &[String]) -> EngineResult<()> {
    let locations: HashMap<String, String> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            (row.object_type == ObjectType::Location)
                .then(|| row.attr_str("code").map(|c| (c.to_string(), id.clone())))
                .flatten()
        })
        .collect();

    for id in active {
        let deferred_code = graph
            .node(id)
            .unwrap()
            .operation
            .payload
            .get("_deferred_location_code")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let Some(code) = deferred_code else { continue };
        if let Some(location_id) = locations.get(&code) {
            if location_id != id {
                graph.add_dependency(id, location_id, EdgeKind::ParentChild)?;
            }
        }
    }
    Ok(())
}

/// §4.2.3 seventh bullet: host records with pipe-separated `addresses`
/// depend on every network (by CIDR containment) holding at least one of
/// those addresses.
fn detect_host_record_network_edges(graph: &mut DependencyGraph, active: &[String]) -> EngineResult<()> {
    let networks: Vec<(String, Ipv4Addr, u32)> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            if row.object_type != ObjectType::Ip4Network {
                return None;
            }
            let cidr = row.attr_str("cidr")?;
            parse_ipv4_cidr(cidr).map(|(addr, prefix)| (id.clone(), addr, prefix))
        })
        .collect();

    for id in active {
        let row = &graph.node(id).unwrap().operation.csv_row;
        if row.object_type != ObjectType::HostRecord {
            continue;
        }
        let Some(addresses) = row.attr_str("addresses") else { continue };
        for address in addresses.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            let Ok(ip) = address.parse::<Ipv4Addr>() else { continue };
            for (network_id, network_addr, prefix) in &networks {
                if ipv4_contains(*network_addr, *prefix, ip) {
                    graph.add_dependency(id, network_id, EdgeKind::ParentChild)?;
                }
            }
        }
    }
    Ok(())
}

fn parse_ipv4_cidr(cidr: &str) -> Option<(Ipv4Addr, u32)> {
    let (addr, prefix) = cidr.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u32 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((addr, prefix))
}

fn ipv4_contains(network: Ipv4Addr, prefix: u32, candidate: Ipv4Addr) -> bool {
    if prefix == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - prefix);
    (u32::from(network) & mask) == (u32::from(candidate) & mask)
}

/// §4.2.4: `alias_record.linked_record_name`, `mx_record.exchange`, and
/// `srv_record.target` depend by exact name match on a host/external-host
/// record.
fn detect_record_reference_edges(graph: &mut DependencyGraph, active: &[String]) -> EngineResult<()> {
    let records_by_name: HashMap<String, String> = active
        .iter()
        .filter_map(|id| {
            let row = &graph.node(id).unwrap().operation.csv_row;
            matches!(row.object_type, ObjectType::HostRecord | ObjectType::ExternalHostRecord)
                .then(|| row.attr_str("name").map(|n| (n.to_string(), id.clone())))
                .flatten()
        })
        .collect();

    for id in active {
        let row = &graph.node(id).unwrap().operation.csv_row;
        let referenced = match row.object_type {
            ObjectType::AliasRecord => row.attr_str("linked_record_name"),
            ObjectType::MxRecord => row.attr_str("exchange"),
            ObjectType::SrvRecord => row.attr_str("target"),
            _ => None,
        };
        let Some(referenced) = referenced else { continue };
        if let Some(target_id) = records_by_name.get(referenced) {
            if target_id != id {
                graph.add_dependency(id, target_id, EdgeKind::Reference)?;
            }
        }
    }
    Ok(())
}

/// §4.2.5: inject per-phase barriers. Delete phases run in reverse (8->0)
/// with every delete operation in phase N a dependency of the phase-N
/// barrier, and the phase N-1 (higher-numbered) barrier a dependency of
/// phase N's first delete operation's barrier chain. Create/update phases
/// run forward (0->8) symmetrically. Finally, the first create/update-chain
/// barrier depends on the last delete-chain barrier so every DELETE is
/// terminal before any CREATE/UPDATE begins.
fn apply_phase_barriers(graph: &mut DependencyGraph, node_ids: &[String]) -> EngineResult<()> {
    let mut by_phase_delete: Vec<Vec<String>> = vec![Vec::new(); PHASE_COUNT];
    let mut by_phase_other: Vec<Vec<String>> = vec![Vec::new(); PHASE_COUNT];

    for id in node_ids {
        let operation = &graph.node(id).unwrap().operation;
        let Some(phase) = phase_of(operation.object_type) else {
            continue; // SystemBarrier nodes themselves are skipped
        };
        if operation.operation_type == OperationType::Delete {
            by_phase_delete[phase].push(id.clone());
        } else {
            by_phase_other[phase].push(id.clone());
        }
    }

    // Delete phases run in reverse (8 -> 0): each phase's operations become
    // a dependency of its own barrier, and depend themselves on the barrier
    // of the previously-processed (higher-numbered) phase.
    let mut last_delete_barrier: Option<String> = None;
    for phase in (0..PHASE_COUNT).rev() {
        let ops = &by_phase_delete[phase];
        if ops.is_empty() {
            continue;
        }
        if let Some(prev) = &last_delete_barrier {
            for op_id in ops {
                graph.add_dependency(op_id, prev, EdgeKind::Prerequisite)?;
            }
        }
        let barrier = graph.add_barrier_node(phase);
        for op_id in ops {
            graph.add_dependency(&barrier, op_id, EdgeKind::Prerequisite)?;
        }
        last_delete_barrier = Some(barrier);
    }

    // Create/update phases run forward (0 -> 8), seeded by the last delete
    // barrier so every DELETE is terminal before any CREATE/UPDATE starts.
    let mut last_other_barrier: Option<String> = last_delete_barrier;
    for phase in 0..PHASE_COUNT {
        let ops = &by_phase_other[phase];
        if ops.is_empty() {
            continue;
        }
        if let Some(prev) = &last_other_barrier {
            for op_id in ops {
                graph.add_dependency(op_id, prev, EdgeKind::Prerequisite)?;
            }
        }
        let barrier = graph.add_barrier_node(phase + PHASE_COUNT);
        for op_id in ops {
            graph.add_dependency(&barrier, op_id, EdgeKind::Prerequisite)?;
        }
        last_other_barrier = Some(barrier);
    }

    Ok(())
}
