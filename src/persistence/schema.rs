//! SQL DDL for the change log, checkpoints, and created-resources tables (§4.7)

use crate::error::EngineResult;
use rusqlite::Connection;

const CHANGE_LOG_DDL: &str = "
CREATE TABLE IF NOT EXISTS change_log (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id      TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    row_id          TEXT NOT NULL,
    object_type     TEXT NOT NULL,
    operation_type  TEXT NOT NULL,
    success         INTEGER NOT NULL,
    resource_id     INTEGER,
    error_message   TEXT,
    before_state    TEXT,
    after_state     TEXT
);
CREATE INDEX IF NOT EXISTS idx_change_log_session ON change_log(session_id);
";

const CHECKPOINTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id              TEXT NOT NULL,
    timestamp                TEXT NOT NULL,
    batch_id                 INTEGER NOT NULL,
    operation_index          INTEGER NOT NULL,
    completed_operations     INTEGER NOT NULL,
    total_operations         INTEGER NOT NULL,
    status                   TEXT NOT NULL,
    input_hash               TEXT NOT NULL,
    metadata                 TEXT
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id);
CREATE INDEX IF NOT EXISTS idx_checkpoints_timestamp ON checkpoints(timestamp);
";

const CREATED_RESOURCES_DDL: &str = "
CREATE TABLE IF NOT EXISTS created_resources (
    session_id      TEXT NOT NULL,
    resource_type   TEXT NOT NULL,
    resource_key    TEXT NOT NULL,
    bam_id          INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (session_id, resource_type, resource_key)
);
";

/// Create every table (and index) this crate needs, if not already present.
pub fn initialize_schema(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(CHANGE_LOG_DDL)?;
    conn.execute_batch(CHECKPOINTS_DDL)?;
    conn.execute_batch(CREATED_RESOURCES_DDL)?;
    Ok(())
}
