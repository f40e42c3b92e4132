//! SQLite-backed task store.
//!
//! One flat `scheduler_task` table plus a `scheduler_task_group` lookup
//! table, accessed through an internal `Mutex<Connection>`. Writes are
//! independent statements, not one wrapping transaction: a failing pass
//! leaves earlier writes applied and the next pass converges.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::schema::{apply_schema, read_schema_version};
use super::{StoreError, StoredTaskRecord, TASK_GROUP_NAME, TaskStore};
use crate::task::TaskInstance;

/// Description written onto the lazily created task group row.
const TASK_GROUP_DESCRIPTION: &str = "Tasks managed by cronsync (scheduler/tasks.yaml)";

const RECORD_COLUMNS: &str = "uid, crdate, next_execution, disabled, description, \
     task_group, serialized_task, sync_identifier, sync_fingerprint";

/// [`TaskStore`] over a single SQLite database file.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read the stamped schema version from the database.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        read_schema_version(&conn).map_err(StoreError::Sqlite)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl TaskStore for SqliteTaskStore {
    fn insert(
        &self,
        identifier: &str,
        task: &mut TaskInstance,
        fingerprint: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now().timestamp();
        let next_execution = task.recurrence.next_due(now);
        let blob = task.to_stored_json()?;

        conn.execute(
            "INSERT INTO scheduler_task \
             (crdate, next_execution, disabled, description, task_group, \
              serialized_task, sync_identifier, sync_fingerprint) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                now,
                next_execution,
                task.disabled,
                task.description,
                task.task_group,
                blob,
                identifier,
                fingerprint
            ],
        )?;
        let uid = conn.last_insert_rowid();

        // The stored blob embeds its own uid, which only exists now that
        // the row does: write it back and re-serialize.
        task.uid = Some(uid);
        let blob = task.to_stored_json()?;
        conn.execute(
            "UPDATE scheduler_task SET serialized_task = ?1 WHERE uid = ?2",
            params![blob, uid],
        )?;

        debug!(task = identifier, uid, "inserted task row");
        Ok(uid)
    }

    fn update(
        &self,
        identifier: &str,
        task: &mut TaskInstance,
        fingerprint: &str,
        uid: i64,
    ) -> Result<(), StoreError> {
        task.uid = Some(uid);
        let conn = self.lock()?;
        let now = Utc::now().timestamp();
        let next_execution = task.recurrence.next_due(now);
        let blob = task.to_stored_json()?;

        let rows = conn.execute(
            "UPDATE scheduler_task SET \
             next_execution = ?1, disabled = ?2, description = ?3, task_group = ?4, \
             serialized_task = ?5, sync_identifier = ?6, sync_fingerprint = ?7 \
             WHERE uid = ?8",
            params![
                next_execution,
                task.disabled,
                task.description,
                task.task_group,
                blob,
                identifier,
                fingerprint,
                uid
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(uid));
        }

        debug!(task = identifier, uid, "updated task row");
        Ok(())
    }

    fn delete(&self, identifier: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM scheduler_task WHERE sync_identifier = ?1",
            params![identifier],
        )?;
        Ok(rows > 0)
    }

    fn list_managed(
        &self,
    ) -> Result<std::collections::BTreeMap<String, StoredTaskRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM scheduler_task WHERE sync_identifier <> ''"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_record)?;

        let mut records = std::collections::BTreeMap::new();
        for r in rows {
            let record = r?;
            records.insert(record.identifier.clone(), record);
        }
        Ok(records)
    }

    fn list_all(&self) -> Result<Vec<StoredTaskRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM scheduler_task ORDER BY uid");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_record)?;

        let mut records = Vec::new();
        for r in rows {
            records.push(r?);
        }
        Ok(records)
    }

    fn task_group_uid(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT uid FROM scheduler_task_group WHERE group_name = ?1",
                params![TASK_GROUP_NAME],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(uid) = existing {
            return Ok(uid);
        }

        conn.execute(
            "INSERT INTO scheduler_task_group (group_name, description) VALUES (?1, ?2)",
            params![TASK_GROUP_NAME, TASK_GROUP_DESCRIPTION],
        )?;
        let uid = conn.last_insert_rowid();
        debug!(group = TASK_GROUP_NAME, uid, "created task group row");
        Ok(uid)
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTaskRecord> {
    Ok(StoredTaskRecord {
        uid: row.get(0)?,
        crdate: row.get(1)?,
        next_execution: row.get(2)?,
        disabled: row.get(3)?,
        description: row.get(4)?,
        task_group: row.get(5)?,
        serialized_task: row.get(6)?,
        identifier: row.get(7)?,
        fingerprint: row.get(8)?,
    })
}
