//! Materialized scheduler tasks.
//!
//! A [`TaskInstance`] is the persisted form of one declared entry after
//! validation: what it runs ([`TaskKind`]), when it recurs
//! ([`Recurrence`]), and the bookkeeping fields the store writes alongside.
//! Instances serialize to the JSON blob kept in the task row, so a stored
//! task can be reconstructed without the original document.

use crate::cron::CronSchedule;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a task runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// A registered task type with its public fields populated.
    Class {
        /// Fully qualified type name as known to the type registry.
        class: String,
        /// Field values, registry defaults overlaid with declared properties.
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        fields: serde_json::Map<String, Value>,
    },
    /// A schedulable console command.
    Command {
        /// Command identifier as known to the command registry.
        command: String,
        /// Invocation options passed to the command.
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        options: serde_json::Map<String, Value>,
    },
}

/// When a task should run again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    /// Seconds between runs; 0 means no interval recurrence.
    #[serde(default)]
    pub interval_secs: u64,
    /// Cron expression; wins over the interval when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

impl Recurrence {
    /// Recur every `secs` seconds.
    pub fn interval(secs: u64) -> Self {
        Self {
            interval_secs: secs,
            cron: None,
        }
    }

    /// Recur per a cron expression.
    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            interval_secs: 0,
            cron: Some(expression.into()),
        }
    }

    /// Unix timestamp of the next run at or after `now`.
    ///
    /// Cron expressions are validated when a task is built; an expression
    /// that nevertheless fails here (a hand-edited stored blob, an
    /// impossible calendar date) falls back to the interval, and a task
    /// with no recurrence at all is due immediately.
    pub fn next_due(&self, now: i64) -> i64 {
        if let Some(expr) = &self.cron {
            if let Ok(schedule) = CronSchedule::parse(expr) {
                if let Some(next) = schedule.next_after(now) {
                    return next;
                }
            }
        }
        if self.interval_secs > 0 {
            now.saturating_add(i64::try_from(self.interval_secs).unwrap_or(i64::MAX))
        } else {
            now
        }
    }
}

/// A fully materialized scheduler task, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    /// Store-assigned row uid; `None` until first persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    /// What the task runs.
    pub kind: TaskKind,
    /// When the task recurs.
    pub recurrence: Recurrence,
    /// Whether the scheduler should skip this task.
    pub disabled: bool,
    /// Human-readable description shown in scheduler UIs.
    pub description: String,
    /// Uid of the task group the task is filed under.
    pub task_group: i64,
}

impl TaskInstance {
    /// Serialize to the JSON blob stored in the task row.
    pub fn to_stored_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Reconstruct from a stored JSON blob.
    pub fn from_stored_json(blob: &str) -> serde_json::Result<Self> {
        serde_json::from_str(blob)
    }
}
