//! A single field-level difference between desired and current state

use super::attr::AttrValue;
use serde::{Deserialize, Serialize};

/// One field whose normalized desired value differs from the normalized
/// current value. Emitted by the diff engine, consumed by the executor to
/// build UPDATE bodies and by the change log to build rollback records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Name of the differing field
    pub field_name: String,
    /// Normalized value currently on the server (`None` if the field was
    /// absent there)
    pub old_value: Option<AttrValue>,
    /// Normalized value the CSV row desires
    pub new_value: Option<AttrValue>,
}
