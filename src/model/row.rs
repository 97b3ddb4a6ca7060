//! The desired-state row produced by the (external) CSV layer

use super::attr::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The fixed resource taxonomy this engine understands (§ Glossary).
///
/// New object types require a corresponding phase assignment in
/// [`crate::graph::phases`] and, typically, a handler in the executor's
/// registry; the type is intentionally closed (not an open string) so a
/// missing phase mapping is a compile error, not a silent runtime gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    DeviceType,
    TagGroup,
    UdfDefinition,
    UdlDefinition,
    MacPool,
    DeviceSubtype,
    Tag,
    Location,
    Ip4Block,
    Ip4Network,
    Ip6Block,
    Ip6Network,
    DnsZone,
    Acl,
    ExternalHostRecord,
    HostRecord,
    Ip4Address,
    Ip6Address,
    Ip4Group,
    MacAddress,
    AliasRecord,
    MxRecord,
    SrvRecord,
    TxtRecord,
    GenericRecord,
    Device,
    Ipv4DhcpRange,
    Ipv6DhcpRange,
    Dhcpv4ClientClass,
    DhcpDeploymentRole,
    DnsDeploymentRole,
    Dhcpv4ClientDeploymentOption,
    Dhcpv4ServiceDeploymentOption,
    DeviceAddress,
    ResourceTag,
    UserDefinedLink,
    AccessRight,
    /// Synthetic node type used only for phase barriers (§4.2.5); never
    /// produced by the CSV layer.
    SystemBarrier,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde_json::to_value never fails for a plain enum and the resulting
        // string is always a quoted snake_case identifier.
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        write!(f, "{s}")
    }
}

/// A row's declared intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    Create,
    Update,
    Delete,
}

/// Row identifier: the CSV layer may hand back either an integer sequence
/// number or an opaque string key; both are accepted without the engine
/// caring which.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    /// Integer row id (typical CSV line-sequence numbering)
    Int(i64),
    /// String row id (e.g. a caller-supplied natural key)
    Str(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(i) => write!(f, "{i}"),
            RowId::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Reserved CSV scaffolding fields excluded from field-change computation
/// (§4.1 "Field-change computation").
pub const RESERVED_FIELDS: [&str; 5] = ["row_id", "object_type", "action", "config", "version"];

/// The desired-state record produced by the CSV layer. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    /// Unique within one reconciliation run
    pub row_id: RowId,
    /// Taxonomic tag
    pub object_type: ObjectType,
    /// create / update / delete
    pub action: RowAction,
    /// Server-assigned id, when the row addresses a resource directly
    pub bam_id: Option<i64>,
    /// Type-specific attributes (`cidr`, `address`, `zone_name`, `parent`,
    /// `config`, `view_path`, etc.); unrecognized keys are preserved, not
    /// rejected, since schema evolution lives in the external CSV layer.
    pub attributes: HashMap<String, AttrValue>,
}

impl Row {
    /// Look up an attribute by name, returning `None` for both a missing key
    /// and an explicit [`AttrValue::Null`].
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        match self.attributes.get(name) {
            Some(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }

    /// Convenience accessor for a string-valued attribute.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(AttrValue::as_str)
    }

    /// The node id this row maps to in the dependency graph: `"{object_type}:{row_id}"`.
    pub fn node_id(&self) -> String {
        format!("{}:{}", self.object_type, self.row_id)
    }
}
