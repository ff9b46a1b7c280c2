//! Rollback - snapshot-backed mutating batches
//!
//! Mutating actions run one at a time. Before action *i* is applied its prior
//! state is captured and persisted, so the snapshot stack always covers every
//! applied action. On failure the batch either reverts in strict reverse
//! order ([`RollbackPolicy::RollbackOnFirstFailure`]) or records the failure
//! and moves on ([`RollbackPolicy::ContinueOnFailure`]).

mod batch;
mod journal;
mod types;

pub use batch::{revert, BatchExecutor};
pub(crate) use batch::revert_entry;
pub use journal::{ContextSnapshotJournal, SnapshotJournal};
pub use types::{
    BatchResult, BatchStatus, MutatingAction, RollbackError, RollbackOutcome, RollbackPolicy,
    RollbackSnapshot, SnapshotEntry,
};

/// Snapshot-capable mutation interface exposed by mutating workers
#[async_trait::async_trait]
pub trait Mutator: Send + Sync {
    /// Capture the current state of the resource an action touches
    async fn capture(&self, action: &MutatingAction) -> Result<serde_json::Value, RollbackError>;

    /// Apply the action. Must dedupe on `action.operation_id`.
    async fn apply(&self, action: &MutatingAction) -> Result<serde_json::Value, RollbackError>;

    /// Restore a captured prior state
    async fn restore(&self, entry: &SnapshotEntry) -> Result<(), RollbackError>;
}

#[cfg(test)]
mod tests;
