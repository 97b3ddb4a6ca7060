//! Append-only change log (§4.7 "Change log")

use crate::error::EngineResult;
use crate::model::{ObjectType, OperationType};
use rusqlite::{params, Connection};

/// One append-only change-log row (§3 "ChangeLogEntry").
#[derive(Debug, Clone)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub row_id: String,
    pub object_type: String,
    pub operation_type: String,
    pub success: bool,
    pub resource_id: Option<i64>,
    pub error_message: Option<String>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
}

/// Everything needed to append one entry; `id` and `timestamp` are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewChangeLogEntry {
    pub session_id: String,
    pub row_id: String,
    pub object_type: ObjectType,
    pub operation_type: OperationType,
    pub success: bool,
    pub resource_id: Option<i64>,
    pub error_message: Option<String>,
    /// Full current-resource snapshot at diff time (§9 OQ1 decision), serialized
    pub before_state: Option<String>,
    /// Post-mutation snapshot, serialized
    pub after_state: Option<String>,
}

/// Append `entry` to `change_log`, stamping it with the current UTC time.
pub fn record_operation(conn: &Connection, entry: NewChangeLogEntry) -> EngineResult<()> {
    let timestamp = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO change_log
            (session_id, timestamp, row_id, object_type, operation_type, success,
             resource_id, error_message, before_state, after_state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.session_id,
            timestamp,
            entry.row_id,
            entry.object_type.to_string(),
            format!("{:?}", entry.operation_type).to_uppercase(),
            entry.success,
            entry.resource_id,
            entry.error_message,
            entry.before_state,
            entry.after_state,
        ],
    )?;
    Ok(())
}

/// Return every entry for `session_id` in insertion order.
pub fn get_session_entries(conn: &Connection, session_id: &str) -> EngineResult<Vec<ChangeLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, timestamp, row_id, object_type, operation_type, success,
                resource_id, error_message, before_state, after_state
         FROM change_log WHERE session_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![session_id], |row| {
        Ok(ChangeLogEntry {
            id: row.get(0)?,
            session_id: row.get(1)?,
            timestamp: row.get(2)?,
            row_id: row.get(3)?,
            object_type: row.get(4)?,
            operation_type: row.get(5)?,
            success: row.get(6)?,
            resource_id: row.get(7)?,
            error_message: row.get(8)?,
            before_state: row.get(9)?,
            after_state: row.get(10)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
