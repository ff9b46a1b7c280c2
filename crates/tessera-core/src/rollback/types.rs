use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worker::{FailureDetail, FailureKind, StepResult};

/// What a mutating batch does when one action fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Revert every applied action in reverse order and stop
    RollbackOnFirstFailure,
    /// Record the failure and continue with the next action
    #[default]
    ContinueOnFailure,
}

/// One mutation inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutatingAction {
    /// Stable ID used by the mutator for deduplication
    pub operation_id: String,
    /// Resource reference
    pub resource: String,
    /// Desired change (mutator specific)
    #[serde(default)]
    pub change: serde_json::Value,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

impl MutatingAction {
    /// Create an action
    #[must_use]
    pub fn new(
        operation_id: impl Into<String>,
        resource: impl Into<String>,
        change: serde_json::Value,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            resource: resource.into(),
            change,
            description: None,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Prior state of one resource, captured before a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Action the snapshot was captured for
    pub operation_id: String,
    /// Resource reference
    pub resource: String,
    /// Captured prior state
    pub prior_state: serde_json::Value,
    /// When it was captured
    pub captured_at: DateTime<Utc>,
}

/// Ordered stack of snapshots, consumed last-in first-out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl RollbackSnapshot {
    /// Create an empty snapshot stack
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the snapshot of the next action
    pub fn push(&mut self, entry: SnapshotEntry) {
        self.entries.push(entry);
    }

    /// Pop the most recent snapshot
    pub fn pop(&mut self) -> Option<SnapshotEntry> {
        self.entries.pop()
    }

    /// Entries in capture order
    #[must_use]
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Number of snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of reverting one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    /// Reverted action
    pub operation_id: String,
    /// Resource reference
    pub resource: String,
    /// Whether the prior state was restored
    pub reverted: bool,
    /// Restore error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal state of a mutating batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every action applied
    AllApplied,
    /// Some actions failed and were skipped
    PartialSuccess,
    /// An action failed and every earlier action was reverted
    RolledBack,
    /// An action failed and at least one revert failed
    RollbackIncomplete,
}

/// Outcome of [`BatchExecutor::execute`](super::BatchExecutor::execute)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Policy the batch ran under
    pub policy: RollbackPolicy,
    /// Terminal state
    pub status: BatchStatus,
    /// Operation IDs applied and still in effect
    pub applied: Vec<String>,
    /// Failed actions
    pub failed: Vec<FailureDetail>,
    /// Revert outcomes, in revert order
    pub rolled_back: Vec<RollbackOutcome>,
    /// Snapshots of the actions still in effect, in apply order
    #[serde(skip)]
    pub snapshots: Vec<SnapshotEntry>,
}

impl BatchResult {
    /// Resources whose revert failed
    #[must_use]
    pub fn unreverted(&self) -> Vec<String> {
        self.rolled_back
            .iter()
            .filter(|o| !o.reverted)
            .map(|o| o.resource.clone())
            .collect()
    }

    /// Convert to the step result reported for the owning step
    #[must_use]
    pub fn to_step_result(&self) -> StepResult {
        match self.status {
            BatchStatus::AllApplied => StepResult::success(serde_json::json!({
                "applied": self.applied,
            })),
            BatchStatus::PartialSuccess if self.applied.is_empty() => {
                let kind = self
                    .failed
                    .first()
                    .map_or(FailureKind::InternalError, |d| d.kind);
                StepResult::failure(kind, self.first_failure_message())
            }
            BatchStatus::PartialSuccess => {
                StepResult::partial(self.applied.clone(), self.failed.clone())
            }
            BatchStatus::RolledBack => {
                let kind = self
                    .failed
                    .first()
                    .map_or(FailureKind::InternalError, |d| d.kind);
                StepResult::failure(
                    kind,
                    format!(
                        "{}; {} applied action(s) rolled back",
                        self.first_failure_message(),
                        self.rolled_back.len()
                    ),
                )
            }
            BatchStatus::RollbackIncomplete => StepResult::failure(
                FailureKind::InternalError,
                format!(
                    "{}; rollback incomplete for {}",
                    self.first_failure_message(),
                    self.unreverted().join(", ")
                ),
            ),
        }
    }

    fn first_failure_message(&self) -> String {
        self.failed.first().map_or_else(
            || "batch failed".to_string(),
            |d| format!("{} failed: {}", d.item, d.message),
        )
    }
}

/// Errors raised while capturing, applying or restoring
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    /// Prior state could not be captured; the action is not applied
    #[error("failed to capture state of '{resource}': {message}")]
    Capture {
        /// Resource reference
        resource: String,
        /// Detailed message
        message: String,
    },

    /// The action itself failed
    #[error("action '{operation_id}' failed ({kind}): {message}")]
    Apply {
        /// Failed action
        operation_id: String,
        /// Failure classification
        kind: FailureKind,
        /// Detailed message
        message: String,
    },

    /// Restoring a snapshot failed
    #[error("failed to restore '{resource}': {message}")]
    Restore {
        /// Resource reference
        resource: String,
        /// Detailed message
        message: String,
    },

    /// The snapshot could not be persisted
    #[error("snapshot journal error: {0}")]
    Journal(String),
}

impl RollbackError {
    /// Failure classification of this error
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Apply { kind, .. } => *kind,
            _ => FailureKind::InternalError,
        }
    }
}
