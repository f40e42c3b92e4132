//! Persistence for scheduler task rows.
//!
//! [`TaskStore`] is the seam between the reconciler and the database: five
//! operations plus task-group lookup, no reconciliation logic. The shipped
//! backend is [`SqliteTaskStore`]; tests substitute in-memory fakes.
//!
//! A row is *managed* when its owner-marker column (`sync_identifier`) is
//! non-empty. Rows with an empty marker belong to someone else and are
//! never written or deleted.

mod schema;
mod sqlite;

pub use sqlite::SqliteTaskStore;

use crate::task::TaskInstance;
use std::collections::BTreeMap;

/// Name of the task group all managed rows are filed under.
pub const TASK_GROUP_NAME: &str = "cron_jobs";

/// One row of the `scheduler_task` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTaskRecord {
    /// Store-assigned row uid.
    pub uid: i64,
    /// Creation time, unix seconds.
    pub crdate: i64,
    /// Next scheduled run, unix seconds.
    pub next_execution: i64,
    /// Whether the scheduler should skip this task.
    pub disabled: bool,
    /// Human-readable description.
    pub description: String,
    /// Uid of the owning task group; 0 when ungrouped.
    pub task_group: i64,
    /// JSON blob of the [`TaskInstance`].
    pub serialized_task: String,
    /// Owner marker; empty for rows not managed by this tool.
    pub identifier: String,
    /// Content fingerprint of the declared entry that produced this row.
    pub fingerprint: String,
}

impl StoredTaskRecord {
    /// Whether this row is owned by the synchronizer.
    pub fn is_managed(&self) -> bool {
        !self.identifier.is_empty()
    }
}

/// Provides the uid of the task group managed rows are filed under.
///
/// The reconciler passes a memoizing implementation into each build, so
/// the group row is looked up (or lazily created) at most once per pass.
pub trait TaskGroupSource {
    /// Uid of the managed task group, creating the row if needed.
    fn task_group_uid(&mut self) -> Result<i64, StoreError>;
}

/// Store operations the reconciler and exporter drive.
pub trait TaskStore {
    /// Insert a new managed row and return its uid.
    ///
    /// The store assigns the uid, writes it back into `task`, and persists
    /// the re-serialized blob so the stored form embeds its own uid.
    fn insert(
        &self,
        identifier: &str,
        task: &mut TaskInstance,
        fingerprint: &str,
    ) -> Result<i64, StoreError>;

    /// Rewrite the managed row `uid` in place.
    ///
    /// `task.uid` is set to `uid` before serialization. Scheduling state
    /// (`next_execution`) is recomputed from the instance's recurrence.
    fn update(
        &self,
        identifier: &str,
        task: &mut TaskInstance,
        fingerprint: &str,
        uid: i64,
    ) -> Result<(), StoreError>;

    /// Delete the row owned by `identifier`; `false` when none existed.
    fn delete(&self, identifier: &str) -> Result<bool, StoreError>;

    /// All managed rows, keyed by owner marker.
    fn list_managed(&self) -> Result<BTreeMap<String, StoredTaskRecord>, StoreError>;

    /// Every row in the table, managed or not, in uid order.
    fn list_all(&self) -> Result<Vec<StoredTaskRecord>, StoreError>;

    /// Uid of the managed task group, creating the row if needed.
    fn task_group_uid(&self) -> Result<i64, StoreError>;
}

/// Task store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("task serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("task row not found: uid {0}")]
    NotFound(i64),

    #[error("lock poisoned: {0}")]
    Lock(String),
}
