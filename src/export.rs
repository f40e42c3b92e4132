//! Export of stored tasks as a declarative document draft.
//!
//! Walks every row in the store, managed or not, reconstructs a
//! [`DeclaredTask`] from each task blob, and derives an identifier from
//! what the task runs. Rows whose blob does not parse are skipped rather
//! than failing the export. The result is a one-time migration draft, not
//! guaranteed to re-import unchanged.

use crate::config::{DeclaredTask, TaskDocument};
use crate::error::Result;
use crate::store::TaskStore;
use crate::task::{TaskInstance, TaskKind};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Reconstruct a declarative document from every stored task row.
pub fn export_tasks(store: &dyn TaskStore) -> Result<TaskDocument> {
    let mut tasks: IndexMap<String, DeclaredTask> = IndexMap::new();

    for record in store.list_all()? {
        let instance = match TaskInstance::from_stored_json(&record.serialized_task) {
            Ok(instance) => instance,
            Err(e) => {
                warn!(uid = record.uid, error = %e, "skipping task row with unreadable blob");
                continue;
            }
        };

        let base = derive_identifier(&instance.kind);
        let mut identifier = base.clone();
        let mut n = 0;
        while tasks.contains_key(&identifier) {
            n += 1;
            identifier = format!("{base}-{n}");
        }

        tasks.insert(identifier, to_declared(&instance));
    }

    debug!(count = tasks.len(), "exported stored tasks");
    Ok(TaskDocument { tasks })
}

/// Identifier for one task: the command name with `:` replaced by `-`, or
/// the type's last path segment with a trailing `Task` suffix stripped.
fn derive_identifier(kind: &TaskKind) -> String {
    match kind {
        TaskKind::Command { command, .. } => command.replace(':', "-"),
        TaskKind::Class { class, .. } => {
            let short = class.rsplit('\\').next().unwrap_or(class);
            short
                .strip_suffix("Task")
                .filter(|stripped| !stripped.is_empty())
                .unwrap_or(short)
                .to_owned()
        }
    }
}

fn to_declared(instance: &TaskInstance) -> DeclaredTask {
    let mut declared = DeclaredTask {
        disabled: instance.disabled,
        cron_cmd: instance.recurrence.cron.clone(),
        ..DeclaredTask::default()
    };
    if !instance.description.is_empty() {
        declared.description = Some(instance.description.clone());
    }
    if instance.recurrence.interval_secs > 0 {
        declared.interval = Some(instance.recurrence.interval_secs);
    }
    match &instance.kind {
        TaskKind::Command { command, options } => {
            declared.command = Some(command.clone());
            if !options.is_empty() {
                declared.options = Some(options.clone());
            }
        }
        TaskKind::Class { class, fields } => {
            declared.class = Some(class.clone());
            if !fields.is_empty() {
                declared.properties = Some(fields.clone());
            }
        }
    }
    declared
}
