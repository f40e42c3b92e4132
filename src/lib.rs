//! cronsync: declarative scheduler-task synchronization.
//!
//! A YAML document declares the scheduled tasks a deployment should have;
//! a SQLite database holds the tasks the scheduler actually knows. One
//! `sync` pass reconciles the two: new entries are inserted, changed
//! entries (by content fingerprint) are rewritten in place, entries that
//! vanished from the document are deleted, and rows not owned by cronsync
//! are never touched. `export` walks the database the other way and emits
//! a document draft for one-time migration.
//!
//! # Architecture
//!
//! The pass is single-threaded and run-to-completion, built from small
//! modules wired together at the binary:
//! - **config**: loads `scheduler/tasks.yaml` (with `imports:`) into an
//!   ordered document
//! - **fingerprint**: canonical-JSON SHA-256 of one declared entry
//! - **condition**: gates entries on context expressions
//! - **registry**: injected task-type and command registries
//! - **builder**: validates an entry and materializes a [`TaskInstance`]
//! - **store**: the `scheduler_task` table behind the [`TaskStore`] trait
//! - **sync**: the reconciliation pass itself
//! - **export**: database back to document

pub mod builder;
pub mod condition;
pub mod config;
pub mod cron;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod registry;
pub mod store;
pub mod sync;
pub mod task;

pub use builder::TaskBuilder;
pub use condition::{ConditionEvaluator, ContextConditionEvaluator};
pub use config::{CONFIG_FILENAME, DeclaredTask, TaskDocument};
pub use error::{Result, SyncError};
pub use export::export_tasks;
pub use store::{SqliteTaskStore, StoredTaskRecord, TaskStore};
pub use sync::{Reconciler, SyncSummary};
pub use task::{Recurrence, TaskInstance, TaskKind};
