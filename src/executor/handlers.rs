//! Per-type natural-key derivation for conflict lookup and created-resource
//! bookkeeping (§4.6.3 "Storing created resources", §4.6.4 "Existing-resource
//! lookup for conflict")
//!
//! The source system dispatches CREATE/UPDATE/DELETE through a registry of
//! per-type handler objects; in this crate [`crate::collaborators::IpamClient`]
//! already takes `ObjectType` as a parameter on every method, so the registry
//! collapses to the one thing that *is* genuinely type-specific and lives on
//! the engine side of the boundary: how to name a resource for natural-key
//! lookup and for the `created_*` maps.

use crate::model::{ObjectType, Row};

/// The outcome a handler call settles to, replacing the source system's
/// duck-typed "either an OperationResult or a mapping with `id`" acceptance
/// with a closed type (§4.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Created { id: i64 },
    Updated,
    Deleted,
}

/// The `created_*` map this object type's CREATEs are recorded under, or
/// `None` for types the deferred resolver never needs to look up (§4.4's
/// marker table only covers seven types).
fn created_resource_type(object_type: ObjectType) -> Option<&'static str> {
    match object_type {
        ObjectType::Ip4Block | ObjectType::Ip6Block => Some("block"),
        ObjectType::Ip4Network | ObjectType::Ip6Network => Some("network"),
        ObjectType::DnsZone => Some("zone"),
        ObjectType::Location => Some("location"),
        ObjectType::DeviceType => Some("device_type"),
        ObjectType::DeviceSubtype => Some("device_subtype"),
        ObjectType::Device => Some("device"),
        _ => None,
    }
}

/// Derive every `(resource_type, resource_key)` pair a successful CREATE of
/// `row` should be recorded under (§4.6.3). Devices register under both
/// `"{config}/{name}"` and the bare `name` fallback so a deferred marker
/// without a companion config still resolves.
pub fn created_resource_keys(row: &Row) -> Vec<(&'static str, String)> {
    let Some(resource_type) = created_resource_type(row.object_type) else {
        return Vec::new();
    };

    match row.object_type {
        ObjectType::Ip4Block | ObjectType::Ip6Block | ObjectType::Ip4Network | ObjectType::Ip6Network => {
            row.attr_str("cidr").map(|cidr| vec![(resource_type, cidr.to_string())]).unwrap_or_default()
        }
        ObjectType::DnsZone => row
            .attr_str("zone_name")
            .map(|name| vec![(resource_type, name.to_string())])
            .unwrap_or_default(),
        ObjectType::Location => row
            .attr_str("code")
            .map(|code| vec![(resource_type, code.to_string())])
            .unwrap_or_default(),
        ObjectType::DeviceType | ObjectType::DeviceSubtype => row
            .attr_str("name")
            .map(|name| vec![(resource_type, name.to_string())])
            .unwrap_or_default(),
        ObjectType::Device => {
            let Some(name) = row.attr_str("name") else {
                return Vec::new();
            };
            let mut keys = vec![(resource_type, name.to_string())];
            if let Some(config) = row.attr_str("config") {
                keys.push((resource_type, format!("{config}/{name}")));
            }
            keys
        }
        _ => Vec::new(),
    }
}

/// The most specific natural key available for `row`'s object type, handed
/// to [`crate::collaborators::IpamClient::find_by_natural_key`] on a CREATE
/// conflict (§4.6.4). Returns `None` when no type-specific key can be built,
/// in which case the conflict lookup cannot proceed and the original
/// `ResourceAlreadyExists` is re-raised.
pub fn natural_key_for_row(row: &Row) -> Option<String> {
    let config = row.attr_str("config").unwrap_or_default();
    match row.object_type {
        ObjectType::Ip4Block
        | ObjectType::Ip6Block
        | ObjectType::Ip4Network
        | ObjectType::Ip6Network
        | ObjectType::Ip4Address
        | ObjectType::Ip6Address => {
            let value = row.attr_str("cidr").or_else(|| row.attr_str("address"))?;
            Some(format!("{config}:{value}"))
        }
        ObjectType::DnsZone => {
            let view = row.attr_str("view_path").unwrap_or_default();
            let zone_name = row.attr_str("zone_name")?;
            Some(format!("{config}/{view}:{zone_name}"))
        }
        ObjectType::HostRecord
        | ObjectType::AliasRecord
        | ObjectType::MxRecord
        | ObjectType::TxtRecord
        | ObjectType::SrvRecord
        | ObjectType::ExternalHostRecord
        | ObjectType::GenericRecord => {
            let view = row.attr_str("view_path").unwrap_or_default();
            let zone_name = row.attr_str("zone_name").unwrap_or_default();
            let name = row.attr_str("name")?;
            Some(format!("{config}/{view}/{zone_name}:{name}"))
        }
        ObjectType::Location => row.attr_str("code").map(|code| format!("{config}:{code}")),
        ObjectType::DeviceType | ObjectType::DeviceSubtype | ObjectType::Device => {
            row.attr_str("name").map(|name| format!("{config}:{name}"))
        }
        _ => row.bam_id.map(|id| format!("id:{id}")),
    }
}
