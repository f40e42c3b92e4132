//! Materialization of declared entries into task instances.
//!
//! The builder is the validation boundary: everything referential (type
//! exists, command is schedulable, cron parses) is checked here, before
//! any store access. A [`TaskInstance`] that leaves this module is safe to
//! persist as-is.

use crate::config::DeclaredTask;
use crate::cron::CronSchedule;
use crate::error::{Result, SyncError};
use crate::registry::{CommandRegistry, TypeRegistry};
use crate::store::TaskGroupSource;
use crate::task::{Recurrence, TaskInstance, TaskKind};

/// Builds [`TaskInstance`]s from declared entries against the injected
/// registries.
pub struct TaskBuilder<'a> {
    types: &'a dyn TypeRegistry,
    commands: &'a dyn CommandRegistry,
}

impl<'a> TaskBuilder<'a> {
    pub fn new(types: &'a dyn TypeRegistry, commands: &'a dyn CommandRegistry) -> Self {
        Self { types, commands }
    }

    /// Materialize one declared entry.
    ///
    /// Fails with [`SyncError::Validation`] when the entry names no task or
    /// two, references an unknown type or a non-schedulable command, or
    /// carries an unparseable cron expression. The task group uid is
    /// resolved last, so a validation failure never touches the store.
    pub fn build(
        &self,
        identifier: &str,
        spec: &DeclaredTask,
        group: &mut dyn TaskGroupSource,
    ) -> Result<TaskInstance> {
        if identifier.is_empty() {
            return Err(SyncError::validation(
                identifier,
                "identifier must not be empty",
            ));
        }

        let kind = match (&spec.class, &spec.command) {
            (None, None) => {
                return Err(SyncError::validation(
                    identifier,
                    "missing `class` or `command`",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(SyncError::validation(
                    identifier,
                    "`class` and `command` are mutually exclusive",
                ));
            }
            (Some(class), None) => self.class_kind(identifier, class, spec)?,
            (None, Some(command)) => self.command_kind(identifier, command, spec)?,
        };

        let recurrence = recurrence_from(identifier, spec)?;
        let description = match spec.description.as_deref() {
            Some(text) if !text.is_empty() => format!("{identifier}: {text}"),
            _ => identifier.to_owned(),
        };
        let task_group = group.task_group_uid()?;

        Ok(TaskInstance {
            uid: None,
            kind,
            recurrence,
            disabled: spec.disabled,
            description,
            task_group,
        })
    }

    fn class_kind(&self, identifier: &str, class: &str, spec: &DeclaredTask) -> Result<TaskKind> {
        let mut fields = self.types.instantiate(class).ok_or_else(|| {
            SyncError::validation(identifier, format!("unknown task type `{class}`"))
        })?;
        if let Some(properties) = &spec.properties {
            for (name, value) in properties {
                fields.insert(name.clone(), value.clone());
            }
        }
        // Types without a registered handler silently ignore the payload.
        if let Some(payload) = &spec.additional_fields
            && let Some(handler) = self.types.additional_fields_handler(class)
        {
            handler.apply(payload, &mut fields);
        }
        Ok(TaskKind::Class {
            class: class.to_owned(),
            fields,
        })
    }

    fn command_kind(
        &self,
        identifier: &str,
        command: &str,
        spec: &DeclaredTask,
    ) -> Result<TaskKind> {
        if !self.commands.is_schedulable(command) {
            return Err(SyncError::validation(
                identifier,
                format!("command `{command}` does not exist or is not schedulable"),
            ));
        }
        Ok(TaskKind::Command {
            command: command.to_owned(),
            options: spec.options.clone().unwrap_or_default(),
        })
    }
}

/// Recurrence from `cronCmd`/`interval`; an empty cron string counts as
/// absent, matching how an unset interval counts as 0.
fn recurrence_from(identifier: &str, spec: &DeclaredTask) -> Result<Recurrence> {
    let cron = spec
        .cron_cmd
        .as_deref()
        .filter(|expr| !expr.trim().is_empty());
    if let Some(expr) = cron {
        CronSchedule::parse(expr).map_err(|e| SyncError::validation(identifier, e.to_string()))?;
    }
    Ok(Recurrence {
        interval_secs: spec.interval.unwrap_or(0),
        cron: cron.map(str::to_owned),
    })
}
