//! Current server-side state, as loaded by resolvers

use super::attr::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A snapshot of one resource as it currently exists on the IPAM server.
/// Immutable per fetch; the diff engine never mutates this, it only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Server-assigned resource id
    pub id: i64,
    /// Server-reported type string (kept as a string — it is the server's
    /// vocabulary, which need not line up 1:1 with [`crate::model::ObjectType`]
    /// variant names across every handler)
    pub r#type: String,
    /// All server-side properties this resource carries
    pub properties: HashMap<String, AttrValue>,
}

impl ResourceState {
    /// Look up a property, returning `None` for both a missing key and an
    /// explicit null, mirroring [`crate::model::Row::attr`].
    pub fn property(&self, name: &str) -> Option<&AttrValue> {
        match self.properties.get(name) {
            Some(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }
}
