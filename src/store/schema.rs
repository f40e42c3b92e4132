//! SQLite DDL for the scheduler task database.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Current schema version, stamped into `schema_meta` on first apply.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the task database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per scheduler task; fields mirror StoredTaskRecord.
CREATE TABLE IF NOT EXISTS scheduler_task (
    uid              INTEGER PRIMARY KEY AUTOINCREMENT,
    crdate           INTEGER NOT NULL DEFAULT 0,
    next_execution   INTEGER NOT NULL DEFAULT 0,
    disabled         INTEGER NOT NULL DEFAULT 0,
    description      TEXT NOT NULL DEFAULT '',
    task_group       INTEGER NOT NULL DEFAULT 0,
    serialized_task  TEXT NOT NULL DEFAULT '',   -- JSON TaskInstance blob
    sync_identifier  TEXT NOT NULL DEFAULT '',   -- owner marker; '' = unmanaged
    sync_fingerprint TEXT NOT NULL DEFAULT ''    -- SHA-256 hex of the declared entry
);

CREATE INDEX IF NOT EXISTS idx_task_sync_identifier ON scheduler_task(sync_identifier);

-- Task groups referenced by scheduler_task.task_group.
CREATE TABLE IF NOT EXISTS scheduler_task_group (
    uid         INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name  TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT ''
);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times since all statements use `IF NOT EXISTS`.
/// Inserts the current schema version into `schema_meta` if not already
/// present.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
///
/// Returns `None` if the `schema_meta` table is empty or the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
