//! Diff engine: per-row reconciliation against current server state (§4.1)

mod engine;
pub mod normalize;
mod orphan;

pub use engine::{compute_field_changes, validate_action, DiffEngine};
pub use orphan::{detect_orphans, OrphanCandidate};
