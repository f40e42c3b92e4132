//! Declarative reconciliation of the task document against the store.
//!
//! One pass walks the declared entries in document order, diffing each
//! against the managed rows by content fingerprint, and ends by deleting
//! every managed row no longer declared. Running the same pass twice
//! issues no writes the second time.
//!
//! An entry whose condition evaluates to false is treated exactly like an
//! absent entry: it is skipped *without* being removed from the deletion
//! candidates, so a previously synced row disappears when its condition
//! stops matching.

use crate::builder::TaskBuilder;
use crate::condition::ConditionEvaluator;
use crate::config::TaskDocument;
use crate::error::{Result, SyncError};
use crate::fingerprint::fingerprint;
use crate::store::{StoreError, TaskGroupSource, TaskStore};
use std::fmt;
use tracing::{debug, info};

/// Counters for one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Entries inserted as new rows.
    pub added: usize,
    /// Entries whose row was rewritten after a fingerprint change.
    pub updated: usize,
    /// Entries already present with an equal fingerprint.
    pub unchanged: usize,
    /// Managed rows deleted because no declared entry owns them anymore.
    pub deleted: usize,
    /// Entries skipped because their condition did not match.
    pub skipped: usize,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {}, updated {}, unchanged {}, deleted {}, skipped {}",
            self.added, self.updated, self.unchanged, self.deleted, self.skipped
        )
    }
}

/// Memoizes the task group uid for the duration of one pass, so the group
/// row is resolved (and lazily created) at most once per run.
struct GroupCache<'a> {
    store: &'a dyn TaskStore,
    uid: Option<i64>,
}

impl TaskGroupSource for GroupCache<'_> {
    fn task_group_uid(&mut self) -> std::result::Result<i64, StoreError> {
        if let Some(uid) = self.uid {
            return Ok(uid);
        }
        let uid = self.store.task_group_uid()?;
        self.uid = Some(uid);
        Ok(uid)
    }
}

/// Drives reconciliation passes against one store.
pub struct Reconciler<'a> {
    store: &'a dyn TaskStore,
    builder: TaskBuilder<'a>,
    conditions: &'a dyn ConditionEvaluator,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn TaskStore,
        builder: TaskBuilder<'a>,
        conditions: &'a dyn ConditionEvaluator,
    ) -> Self {
        Self {
            store,
            builder,
            conditions,
        }
    }

    /// Run one reconciliation pass over `document`.
    ///
    /// Aborts on the first error, leaving earlier writes applied; a rerun
    /// after the cause is fixed converges. On success every declared entry
    /// with a matching condition owns exactly one row.
    pub fn run(&self, document: &TaskDocument) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        let mut remaining = self.store.list_managed()?;
        let mut group = GroupCache {
            store: self.store,
            uid: None,
        };

        for (identifier, spec) in &document.tasks {
            if let Some(expression) = &spec.condition {
                let included =
                    self.conditions
                        .evaluate(expression)
                        .map_err(|source| SyncError::Condition {
                            identifier: identifier.clone(),
                            source,
                        })?;
                if !included {
                    // Not removed from `remaining`: a stored row whose
                    // condition stopped matching is deleted below.
                    info!(task = %identifier, condition = %expression, "condition does not match, skipping");
                    summary.skipped += 1;
                    continue;
                }
            }

            let existing = remaining.remove(identifier);
            let digest = fingerprint(spec).map_err(|e| {
                SyncError::validation(identifier, format!("cannot serialize entry: {e}"))
            })?;

            match existing {
                Some(record) if record.fingerprint == digest => {
                    debug!(task = %identifier, "task already present and unchanged");
                    summary.unchanged += 1;
                }
                Some(record) => {
                    let mut task = self.builder.build(identifier, spec, &mut group)?;
                    info!(task = %identifier, uid = record.uid, "task changed, updating");
                    self.store.update(identifier, &mut task, &digest, record.uid)?;
                    summary.updated += 1;
                }
                None => {
                    let mut task = self.builder.build(identifier, spec, &mut group)?;
                    info!(task = %identifier, "new task, adding");
                    self.store.insert(identifier, &mut task, &digest)?;
                    summary.added += 1;
                }
            }
        }

        for identifier in remaining.into_keys() {
            info!(task = %identifier, "task no longer declared, deleting");
            self.store.delete(&identifier)?;
            summary.deleted += 1;
        }

        Ok(summary)
    }
}
