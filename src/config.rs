//! Desired-state document loading.
//!
//! The declared set of scheduler tasks lives in a YAML document at
//! `scheduler/tasks.yaml` under the configuration root: a `tasks:` mapping
//! of identifier to task entry, in document order. A top-level `imports:`
//! list pulls in further documents relative to the importing file; entries
//! in the importing document override imported ones with the same
//! identifier.
//!
//! The serialized form of [`DeclaredTask`] feeds the content fingerprint,
//! so the field names and skip rules here are part of the stored contract.

use crate::error::{Result, SyncError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Relative path of the task document under the configuration root.
pub const CONFIG_FILENAME: &str = "scheduler/tasks.yaml";

/// The parsed desired-state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDocument {
    /// Declared tasks keyed by identifier, in document order.
    pub tasks: IndexMap<String, DeclaredTask>,
}

/// One declared task entry, as written in the document.
///
/// Exactly one of `class` / `command` must be set; that rule is enforced
/// when the entry is materialized, not at parse time. Unknown keys are
/// rejected at parse time so a typo cannot silently drop out of the
/// fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct DeclaredTask {
    /// Free-text description, shown as `identifier: description`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Create the task in disabled state.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    /// Seconds between runs; 0 and absent both mean no interval recurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Cron expression; wins over `interval` when both are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_cmd: Option<String>,
    /// Inclusion condition; an entry whose condition is false is treated
    /// as absent from the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Task type name (class-based tasks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Values for the type's public fields (class-based tasks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
    /// Payload for the type's additional-fields handler (class-based tasks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_fields: Option<Value>,
    /// Console command identifier (command-based tasks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Invocation options (command-based tasks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Map<String, Value>>,
}

/// Raw per-file shape before import merging.
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    imports: Vec<Import>,
    tasks: Option<IndexMap<String, DeclaredTask>>,
}

#[derive(Debug, Deserialize)]
struct Import {
    resource: String,
}

impl TaskDocument {
    /// Load `scheduler/tasks.yaml` under `config_root`, following imports.
    pub fn load(config_root: &Path) -> Result<Self> {
        Self::from_file(&config_root.join(CONFIG_FILENAME))
    }

    /// Load a task document from an explicit path, following imports.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut in_progress = BTreeSet::new();
        let tasks = load_merged(path, &mut in_progress)?;
        Ok(Self { tasks })
    }
}

/// Load one file and everything it imports, imported entries first.
fn load_merged(
    path: &Path,
    in_progress: &mut BTreeSet<PathBuf>,
) -> Result<IndexMap<String, DeclaredTask>> {
    let canonical = path
        .canonicalize()
        .map_err(|e| SyncError::ConfigLoad(format!("cannot read {}: {e}", path.display())))?;
    if !in_progress.insert(canonical.clone()) {
        return Err(SyncError::ConfigLoad(format!(
            "import cycle involving {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&canonical)
        .map_err(|e| SyncError::ConfigLoad(format!("cannot read {}: {e}", path.display())))?;
    let raw: RawDocument = serde_yaml::from_str(&content)
        .map_err(|e| SyncError::ConfigLoad(format!("{}: {e}", path.display())))?;

    let mut merged = IndexMap::new();
    for import in &raw.imports {
        let import_path = match canonical.parent() {
            Some(dir) => dir.join(&import.resource),
            None => PathBuf::from(&import.resource),
        };
        for (identifier, task) in load_merged(&import_path, in_progress)? {
            merged.insert(identifier, task);
        }
    }

    let own = raw.tasks.ok_or_else(|| {
        SyncError::ConfigLoad(format!("{}: missing `tasks` mapping", path.display()))
    })?;
    for (identifier, task) in own {
        merged.insert(identifier, task);
    }

    in_progress.remove(&canonical);
    Ok(merged)
}
