//! Injected registries for task types and console commands.
//!
//! The synchronizer never discovers types or commands on its own: what a
//! deployment can schedule is injected through these two seams. The shipped
//! implementations are static tables, optionally populated from a
//! `scheduler/registry.yaml` manifest next to the task document:
//!
//! ```yaml
//! classes:
//!   Vendor\Tasks\CleanupTask:
//!     defaults:
//!       batchSize: 100
//!   Vendor\Tasks\ReportTask: ~
//! commands:
//!   - cache:flush
//! ```
//!
//! A missing manifest yields empty registries, under which every class- or
//! command-based entry fails validation.

use crate::error::{Result, SyncError};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Relative path of the registry manifest under the configuration root.
pub const REGISTRY_FILENAME: &str = "scheduler/registry.yaml";

/// Applies a declared `additionalFields` payload to a task's field map.
///
/// Handlers are registered per type and receive the payload verbatim; a
/// type without a handler silently ignores the payload.
pub trait AdditionalFieldsHandler {
    /// Merge `payload` into `fields`.
    fn apply(&self, payload: &Value, fields: &mut serde_json::Map<String, Value>);
}

/// Known task types and how to instantiate them.
pub trait TypeRegistry {
    /// Default public-field values for `class`, or `None` when unknown.
    fn instantiate(&self, class: &str) -> Option<serde_json::Map<String, Value>>;

    /// The additional-fields handler registered for `class`, if any.
    fn additional_fields_handler(&self, class: &str) -> Option<&dyn AdditionalFieldsHandler>;
}

/// Console commands that may be scheduled.
pub trait CommandRegistry {
    /// Whether `command` exists and accepts being scheduled.
    fn is_schedulable(&self, command: &str) -> bool;
}

/// [`TypeRegistry`] backed by an in-memory table.
#[derive(Default)]
pub struct StaticTypeRegistry {
    types: BTreeMap<String, serde_json::Map<String, Value>>,
    handlers: BTreeMap<String, Box<dyn AdditionalFieldsHandler>>,
}

impl StaticTypeRegistry {
    /// Register a type with its default field values.
    pub fn register(
        &mut self,
        class: impl Into<String>,
        defaults: serde_json::Map<String, Value>,
    ) {
        self.types.insert(class.into(), defaults);
    }

    /// Attach an additional-fields handler to an already known type.
    pub fn register_handler(
        &mut self,
        class: impl Into<String>,
        handler: Box<dyn AdditionalFieldsHandler>,
    ) {
        self.handlers.insert(class.into(), handler);
    }
}

impl std::fmt::Debug for StaticTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTypeRegistry")
            .field("types", &self.types)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeRegistry for StaticTypeRegistry {
    fn instantiate(&self, class: &str) -> Option<serde_json::Map<String, Value>> {
        self.types.get(class).cloned()
    }

    fn additional_fields_handler(&self, class: &str) -> Option<&dyn AdditionalFieldsHandler> {
        self.handlers.get(class).map(Box::as_ref)
    }
}

/// [`CommandRegistry`] backed by an in-memory set.
#[derive(Debug, Default, Clone)]
pub struct StaticCommandRegistry {
    commands: BTreeSet<String>,
}

impl StaticCommandRegistry {
    /// Build a registry from an iterator of schedulable command names.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Mark one more command as schedulable.
    pub fn register(&mut self, command: impl Into<String>) {
        self.commands.insert(command.into());
    }
}

impl CommandRegistry for StaticCommandRegistry {
    fn is_schedulable(&self, command: &str) -> bool {
        self.commands.contains(command)
    }
}

/// Per-file manifest shape.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegistryManifest {
    classes: IndexMap<String, Option<ClassEntry>>,
    commands: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ClassEntry {
    defaults: serde_json::Map<String, Value>,
}

/// Load both registries from `scheduler/registry.yaml` under `config_root`.
///
/// A missing manifest is not an error; it yields empty registries.
pub fn load_registries(
    config_root: &Path,
) -> Result<(StaticTypeRegistry, StaticCommandRegistry)> {
    let path = config_root.join(REGISTRY_FILENAME);
    if !path.exists() {
        return Ok((StaticTypeRegistry::default(), StaticCommandRegistry::default()));
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| SyncError::ConfigLoad(format!("cannot read {}: {e}", path.display())))?;
    let manifest: RegistryManifest = serde_yaml::from_str(&content)
        .map_err(|e| SyncError::ConfigLoad(format!("{}: {e}", path.display())))?;

    let mut types = StaticTypeRegistry::default();
    for (class, entry) in manifest.classes {
        types.register(class, entry.unwrap_or_default().defaults);
    }
    Ok((types, StaticCommandRegistry::new(manifest.commands)))
}
