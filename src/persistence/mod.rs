//! Change log and checkpoint store, backed by a single `rusqlite` file (§4.7)
//!
//! Two append-only tables and one memoization table share one SQLite
//! connection per engine instance, guarded by a `parking_lot::Mutex`
//! (`rusqlite::Connection` is not `Sync`). The executor's task loop is the
//! only writer (§5 "Shared-resource policy"), so lock contention here is
//! never a concurrency bottleneck, only a compile-time guarantee.

mod changelog;
mod checkpoint;
mod schema;

pub use changelog::{ChangeLogEntry, NewChangeLogEntry};
pub use checkpoint::{Checkpoint, CheckpointStatus, NewCheckpoint};

use crate::error::EngineResult;
use crate::resolver::CreatedResourceMaps;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// The engine's embedded relational persistence handle. One instance per
/// session; cheap to hold behind an `Arc` and share with the executor.
pub struct PersistenceStore {
    conn: Mutex<Connection>,
}

impl PersistenceStore {
    /// Open (creating if absent) a SQLite file at `path` and ensure the
    /// schema exists.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        schema::initialize_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// An ephemeral in-memory store, useful for tests and for a caller that
    /// wants dry-run symmetry without touching disk (§9 OQ2 leaves on-disk
    /// persistence out of dry-run entirely; this constructor exists for
    /// callers/tests that want the same API shape in memory).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn record_operation(&self, entry: NewChangeLogEntry) -> EngineResult<()> {
        changelog::record_operation(&self.conn.lock(), entry)
    }

    pub fn get_session_entries(&self, session_id: &str) -> EngineResult<Vec<ChangeLogEntry>> {
        changelog::get_session_entries(&self.conn.lock(), session_id)
    }

    pub fn save_checkpoint(&self, checkpoint: NewCheckpoint) -> EngineResult<i64> {
        checkpoint::save_checkpoint(&self.conn.lock(), checkpoint)
    }

    pub fn get_latest_checkpoint(&self, session_id: &str) -> EngineResult<Option<Checkpoint>> {
        checkpoint::get_latest_checkpoint(&self.conn.lock(), session_id)
    }

    pub fn find_resumable_session(&self, session_id: &str, input_hash: &str) -> EngineResult<Option<Checkpoint>> {
        checkpoint::find_resumable_session(&self.conn.lock(), session_id, input_hash)
    }

    pub fn mark_session_completed(&self, session_id: &str) -> EngineResult<()> {
        checkpoint::mark_session_completed(&self.conn.lock(), session_id)
    }

    pub fn mark_session_failed(&self, session_id: &str, error: &str) -> EngineResult<()> {
        checkpoint::mark_session_failed(&self.conn.lock(), session_id, error)
    }

    pub fn cleanup_old_checkpoints(&self, retention_days: u32) -> EngineResult<usize> {
        checkpoint::cleanup_old_checkpoints(&self.conn.lock(), retention_days)
    }

    pub fn save_created_resource(
        &self,
        session_id: &str,
        resource_type: &str,
        resource_key: &str,
        bam_id: i64,
    ) -> EngineResult<()> {
        checkpoint::save_created_resource(&self.conn.lock(), session_id, resource_type, resource_key, bam_id)
    }

    pub fn load_created_resources(&self, session_id: &str) -> EngineResult<CreatedResourceMaps> {
        checkpoint::load_created_resources(&self.conn.lock(), session_id)
    }

    pub fn clear_created_resources(&self, session_id: &str) -> EngineResult<()> {
        checkpoint::clear_created_resources(&self.conn.lock(), session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectType, OperationType};

    #[test]
    fn round_trips_a_change_log_entry() {
        let store = PersistenceStore::in_memory().unwrap();
        store
            .record_operation(NewChangeLogEntry {
                session_id: "s1".to_string(),
                row_id: "1".to_string(),
                object_type: ObjectType::Ip4Block,
                operation_type: OperationType::Create,
                success: true,
                resource_id: Some(42),
                error_message: None,
                before_state: None,
                after_state: Some("{\"id\":42}".to_string()),
            })
            .unwrap();
        let entries = store.get_session_entries("s1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_id, Some(42));
    }

    #[test]
    fn checkpoint_round_trip_and_resume_lookup() {
        let store = PersistenceStore::in_memory().unwrap();
        store
            .save_checkpoint(NewCheckpoint {
                session_id: "s1".to_string(),
                batch_id: 1,
                operation_index: 2,
                completed_operations: 2,
                total_operations: 4,
                status: CheckpointStatus::InProgress,
                input_hash: "abc123".to_string(),
                metadata: None,
            })
            .unwrap();

        let latest = store.get_latest_checkpoint("s1").unwrap().unwrap();
        assert_eq!(latest.batch_id, 1);
        assert!(matches!(latest.status, CheckpointStatus::InProgress));

        let resumable = store.find_resumable_session("s1", "abc123").unwrap();
        assert!(resumable.is_some());
        let not_resumable = store.find_resumable_session("s1", "different-hash").unwrap();
        assert!(not_resumable.is_none());
    }

    #[test]
    fn completing_a_session_clears_created_resources() {
        let store = PersistenceStore::in_memory().unwrap();
        store.save_created_resource("s1", "block", "10.0.0.0/8", 1).unwrap();
        store
            .save_checkpoint(NewCheckpoint {
                session_id: "s1".to_string(),
                batch_id: 0,
                operation_index: 0,
                completed_operations: 1,
                total_operations: 1,
                status: CheckpointStatus::InProgress,
                input_hash: "abc123".to_string(),
                metadata: None,
            })
            .unwrap();

        store.mark_session_completed("s1").unwrap();

        let maps = store.load_created_resources("s1").unwrap();
        assert!(maps.blocks.is_empty());
        let latest = store.get_latest_checkpoint("s1").unwrap().unwrap();
        assert!(matches!(latest.status, CheckpointStatus::Completed));
    }

    #[test]
    fn created_resource_upsert_replaces_existing_key() {
        let store = PersistenceStore::in_memory().unwrap();
        store.save_created_resource("s1", "block", "10.0.0.0/8", 1).unwrap();
        store.save_created_resource("s1", "block", "10.0.0.0/8", 2).unwrap();
        let maps = store.load_created_resources("s1").unwrap();
        assert_eq!(maps.blocks.get("10.0.0.0/8"), Some(&2));
    }

    #[test]
    fn cleanup_never_deletes_in_progress_rows() {
        let store = PersistenceStore::in_memory().unwrap();
        store
            .save_checkpoint(NewCheckpoint {
                session_id: "s1".to_string(),
                batch_id: 0,
                operation_index: 0,
                completed_operations: 0,
                total_operations: 1,
                status: CheckpointStatus::InProgress,
                input_hash: "abc".to_string(),
                metadata: None,
            })
            .unwrap();
        let deleted = store.cleanup_old_checkpoints(0).unwrap();
        assert_eq!(deleted, 0);
        assert!(store.get_latest_checkpoint("s1").unwrap().is_some());
    }
}
