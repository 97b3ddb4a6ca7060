//! The mutable unit of work that flows from the graph into the executor

use super::diff_result::OperationType;
use super::row::{ObjectType, Row, RowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix that marks a payload key as a deferred reference rather than a
/// literal value (§4.4).
pub const DEFERRED_PREFIX: &str = "_deferred_";

/// A typed view of a recognized deferred marker (§9 redesign note: the
/// string-keyed map stays at the external/client boundary for wire
/// compatibility, but resolution internally is a match on this enum rather
/// than repeated string lookups).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferredRef {
    /// `_deferred_block_cidr` -> `created_blocks[cidr]`
    BlockCidr(String),
    /// `_deferred_network_cidr` -> `created_networks[cidr]`
    NetworkCidr(String),
    /// `_deferred_zone_name` -> `created_zones[name]`
    ZoneName(String),
    /// `_deferred_location_code` -> `created_locations[code]`
    LocationCode(String),
    /// `_deferred_device_type_name` -> `created_device_types[name]`
    DeviceTypeName(String),
    /// `_deferred_device_subtype_name` -> `created_device_subtypes[name]`
    DeviceSubtypeName(String),
    /// `_deferred_device_name` (+ optional `_deferred_device_config`) ->
    /// `created_devices["{config}/{name}"]` or `created_devices[name]`
    Device {
        /// Optional owning config namespace
        config: Option<String>,
        /// Device name
        name: String,
    },
}

impl DeferredRef {
    /// The payload key(s) this marker occupies, in the order they should be
    /// removed from the working payload on successful resolution.
    pub fn payload_keys(&self) -> Vec<&'static str> {
        match self {
            DeferredRef::BlockCidr(_) => vec!["_deferred_block_cidr"],
            DeferredRef::NetworkCidr(_) => vec!["_deferred_network_cidr"],
            DeferredRef::ZoneName(_) => vec!["_deferred_zone_name"],
            DeferredRef::LocationCode(_) => vec!["_deferred_location_code"],
            DeferredRef::DeviceTypeName(_) => vec!["_deferred_device_type_name"],
            DeferredRef::DeviceSubtypeName(_) => vec!["_deferred_device_subtype_name"],
            DeferredRef::Device { .. } => vec!["_deferred_device_name", "_deferred_device_config"],
        }
    }
}

/// The payload carrying the request body an operation will send, plus any
/// deferred markers awaiting resolution. A plain string-keyed map at the
/// boundary, as the source system represents it; the typed [`DeferredRef`]
/// list is derived from it, not a replacement for it.
pub type Payload = HashMap<String, serde_json::Value>;

/// Lifecycle state of an [`Operation`]. Mutated only by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

impl OperationStatus {
    /// Terminal states are SUCCEEDED / FAILED / SKIPPED (§3 Operation lifecycle).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Skipped
        )
    }
}

/// A unit of work targeting one `(object_type, row_id)`. Created by the
/// (external) operation factory; mutated only by the executor thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Taxonomic type of the target resource
    pub object_type: ObjectType,
    /// Row id this operation was derived from
    pub row_id: RowId,
    /// What kind of call this operation will make
    pub operation_type: OperationType,
    /// Target resource id; required for UPDATE/DELETE once resolved
    pub resource_id: Option<i64>,
    /// Request body, possibly still carrying deferred markers
    pub payload: Payload,
    /// Back-reference to the desired row for late attribute access. Owned,
    /// not borrowed: operations outlive the row slice they were built from
    /// once batching begins.
    pub csv_row: Row,
    /// Current lifecycle state
    pub status: OperationStatus,
    /// Human-readable failure reason, set once `status` reaches FAILED/SKIPPED
    pub error_message: Option<String>,
}

impl Operation {
    /// Globally unique node id: `"{object_type}:{row_id}"`.
    pub fn node_id(&self) -> String {
        format!("{}:{}", self.object_type, self.row_id)
    }

    /// Extract every recognized deferred marker currently present in the payload.
    pub fn deferred_refs(&self) -> Vec<DeferredRef> {
        let mut out = Vec::new();
        if let Some(v) = self.payload.get("_deferred_block_cidr").and_then(|v| v.as_str()) {
            out.push(DeferredRef::BlockCidr(v.to_string()));
        }
        if let Some(v) = self.payload.get("_deferred_network_cidr").and_then(|v| v.as_str()) {
            out.push(DeferredRef::NetworkCidr(v.to_string()));
        }
        if let Some(v) = self.payload.get("_deferred_zone_name").and_then(|v| v.as_str()) {
            out.push(DeferredRef::ZoneName(v.to_string()));
        }
        if let Some(v) = self.payload.get("_deferred_location_code").and_then(|v| v.as_str()) {
            out.push(DeferredRef::LocationCode(v.to_string()));
        }
        if let Some(v) = self.payload.get("_deferred_device_type_name").and_then(|v| v.as_str()) {
            out.push(DeferredRef::DeviceTypeName(v.to_string()));
        }
        if let Some(v) = self
            .payload
            .get("_deferred_device_subtype_name")
            .and_then(|v| v.as_str())
        {
            out.push(DeferredRef::DeviceSubtypeName(v.to_string()));
        }
        if let Some(v) = self.payload.get("_deferred_device_name").and_then(|v| v.as_str()) {
            let config = self
                .payload
                .get("_deferred_device_config")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            out.push(DeferredRef::Device {
                config,
                name: v.to_string(),
            });
        }
        out
    }

    /// `true` if `payload.error` has been set by the operation factory,
    /// signalling a row-level failure that must short-circuit before dispatch
    /// (§4.6 step 2).
    pub fn has_preexisting_error(&self) -> bool {
        self.payload.contains_key("error")
    }

    /// The `payload.error` message, if any.
    pub fn preexisting_error(&self) -> Option<String> {
        self.payload
            .get("error")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// The `payload.traceback` metadata, if any.
    pub fn preexisting_traceback(&self) -> Option<String> {
        self.payload
            .get("traceback")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}
