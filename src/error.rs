//! Error types for the synchronization engine.

use crate::condition::ConditionError;
use crate::store::StoreError;

/// Top-level error type for task synchronization.
///
/// Every variant aborts the current pass; fixing the cause and re-running
/// is always safe because the pass is idempotent.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The desired-state document is missing or unparseable.
    #[error("config load error: {0}")]
    ConfigLoad(String),

    /// A declared task entry failed validation against the registries.
    #[error("invalid task `{identifier}`: {reason}")]
    Validation { identifier: String, reason: String },

    /// A task's inclusion condition could not be evaluated.
    #[error("condition on task `{identifier}` failed")]
    Condition {
        identifier: String,
        #[source]
        source: ConditionError,
    },

    /// Task store read/write error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Validation failure for one declared entry.
    pub fn validation(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SyncError>;
