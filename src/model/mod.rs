//! Data model shared by every pipeline stage (§3)

mod attr;
mod diff_result;
mod field_change;
mod operation;
mod operation_result;
mod resource_state;
mod row;

pub use attr::AttrValue;
pub use diff_result::{DiffResult, OperationType};
pub use field_change::FieldChange;
pub use operation::{DeferredRef, Operation, OperationStatus, Payload, DEFERRED_PREFIX};
pub use operation_result::OperationResult;
pub use resource_state::ResourceState;
pub use row::{ObjectType, Row, RowAction, RowId, RESERVED_FIELDS};
