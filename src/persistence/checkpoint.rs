//! Checkpoint store: resumable session state and created-resource memoization (§4.7)

use crate::error::EngineResult;
use crate::resolver::CreatedResourceMaps;
use rusqlite::{params, Connection, OptionalExtension};

/// Lifecycle state of one reconciliation run (§3 "Checkpoint").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    Failed,
}

impl CheckpointStatus {
    fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => CheckpointStatus::Completed,
            "failed" => CheckpointStatus::Failed,
            _ => CheckpointStatus::InProgress,
        }
    }
}

/// One row of `checkpoints` (§3 "Checkpoint").
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub batch_id: usize,
    pub operation_index: usize,
    pub completed_operations: usize,
    pub total_operations: usize,
    pub status: CheckpointStatus,
    pub input_hash: String,
    pub metadata: Option<String>,
}

/// Everything needed to save a checkpoint; `id` and `timestamp` are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    pub session_id: String,
    pub batch_id: usize,
    pub operation_index: usize,
    pub completed_operations: usize,
    pub total_operations: usize,
    pub status: CheckpointStatus,
    pub input_hash: String,
    pub metadata: Option<String>,
}

/// Save a checkpoint row, stamping it with the current UTC time (§4.6 lifecycle
/// step 1d: "save a checkpoint after the batch").
pub fn save_checkpoint(conn: &Connection, checkpoint: NewCheckpoint) -> EngineResult<i64> {
    let timestamp = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO checkpoints
            (session_id, timestamp, batch_id, operation_index, completed_operations,
             total_operations, status, input_hash, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            checkpoint.session_id,
            timestamp,
            checkpoint.batch_id as i64,
            checkpoint.operation_index as i64,
            checkpoint.completed_operations as i64,
            checkpoint.total_operations as i64,
            checkpoint.status.as_str(),
            checkpoint.input_hash,
            checkpoint.metadata,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let status: String = row.get(6)?;
    let batch_id: i64 = row.get(2)?;
    let operation_index: i64 = row.get(3)?;
    let completed_operations: i64 = row.get(4)?;
    let total_operations: i64 = row.get(5)?;
    Ok(Checkpoint {
        id: row.get(0)?,
        session_id: row.get(1)?,
        batch_id: batch_id as usize,
        operation_index: operation_index as usize,
        completed_operations: completed_operations as usize,
        total_operations: total_operations as usize,
        status: CheckpointStatus::parse(&status),
        timestamp: row.get(7)?,
        input_hash: row.get(8)?,
        metadata: row.get(9)?,
    })
}

const SELECT_CHECKPOINT_COLUMNS: &str =
    "id, session_id, batch_id, operation_index, completed_operations, total_operations, status, timestamp, input_hash, metadata";

/// Most recent checkpoint for `session_id`, regardless of status.
pub fn get_latest_checkpoint(conn: &Connection, session_id: &str) -> EngineResult<Option<Checkpoint>> {
    let sql = format!(
        "SELECT {SELECT_CHECKPOINT_COLUMNS} FROM checkpoints
         WHERE session_id = ?1 ORDER BY id DESC LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let checkpoint = stmt.query_row(params![session_id], row_to_checkpoint).optional()?;
    Ok(checkpoint)
}

/// Latest `in_progress` checkpoint whose `input_hash` matches `input_hash`
/// (§4.7 "find_resumable_session"). Different sessions with the same content
/// hash are not conflated; this only ever considers the most recent
/// in-progress row per `session_id`, so the caller must already know which
/// `session_id` it is trying to resume.
pub fn find_resumable_session(
    conn: &Connection,
    session_id: &str,
    input_hash: &str,
) -> EngineResult<Option<Checkpoint>> {
    let sql = format!(
        "SELECT {SELECT_CHECKPOINT_COLUMNS} FROM checkpoints
         WHERE session_id = ?1 AND status = 'in_progress' AND input_hash = ?2
         ORDER BY id DESC LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let checkpoint = stmt
        .query_row(params![session_id, input_hash], row_to_checkpoint)
        .optional()?;
    Ok(checkpoint)
}

/// Mark every checkpoint row for `session_id` `completed` and clear its
/// `created_resources` (§4.7: "also clears the session's created_resources").
pub fn mark_session_completed(conn: &Connection, session_id: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE checkpoints SET status = 'completed' WHERE session_id = ?1 AND status = 'in_progress'",
        params![session_id],
    )?;
    clear_created_resources(conn, session_id)?;
    Ok(())
}

/// Mark every in-progress checkpoint row for `session_id` `failed`, recording
/// `error` in its metadata column.
pub fn mark_session_failed(conn: &Connection, session_id: &str, error: &str) -> EngineResult<()> {
    let metadata = serde_json::json!({ "error": error }).to_string();
    conn.execute(
        "UPDATE checkpoints SET status = 'failed', metadata = ?2
         WHERE session_id = ?1 AND status = 'in_progress'",
        params![session_id, metadata],
    )?;
    Ok(())
}

/// Delete only terminal (`completed`/`failed`) checkpoint rows older than
/// `retention_days`; `in_progress` rows are never deleted regardless of age
/// (§4.7 "cleanup_old_checkpoints").
pub fn cleanup_old_checkpoints(conn: &Connection, retention_days: u32) -> EngineResult<usize> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();
    let deleted = conn.execute(
        "DELETE FROM checkpoints
         WHERE status IN ('completed', 'failed') AND timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

/// `INSERT OR REPLACE` one created resource under `(session_id, resource_type,
/// resource_key)` (§3 "CreatedResource" uniqueness).
pub fn save_created_resource(
    conn: &Connection,
    session_id: &str,
    resource_type: &str,
    resource_key: &str,
    bam_id: i64,
) -> EngineResult<()> {
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO created_resources
            (session_id, resource_type, resource_key, bam_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, resource_type, resource_key, bam_id, created_at],
    )?;
    Ok(())
}

/// Load every created resource for `session_id`, shaped into the
/// `{resource_type -> {key -> id}}` structure the executor's deferred
/// resolver consumes directly on resume (§4.7 "load_created_resources").
pub fn load_created_resources(conn: &Connection, session_id: &str) -> EngineResult<CreatedResourceMaps> {
    let mut stmt = conn.prepare(
        "SELECT resource_type, resource_key, bam_id FROM created_resources WHERE session_id = ?1",
    )?;
    let rows = stmt.query_map(params![session_id], |row| {
        let resource_type: String = row.get(0)?;
        let resource_key: String = row.get(1)?;
        let bam_id: i64 = row.get(2)?;
        Ok((resource_type, resource_key, bam_id))
    })?;

    let mut maps = CreatedResourceMaps::default();
    for row in rows {
        let (resource_type, resource_key, bam_id) = row?;
        maps.record(&resource_type, &resource_key, bam_id);
    }
    Ok(maps)
}

/// Delete every `created_resources` row for `session_id`.
pub fn clear_created_resources(conn: &Connection, session_id: &str) -> EngineResult<()> {
    conn.execute("DELETE FROM created_resources WHERE session_id = ?1", params![session_id])?;
    Ok(())
}
