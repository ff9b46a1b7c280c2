use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::journal::SnapshotJournal;
use super::types::{
    BatchResult, BatchStatus, MutatingAction, RollbackError, RollbackOutcome, RollbackPolicy,
    RollbackSnapshot, SnapshotEntry,
};
use super::Mutator;
use crate::worker::FailureDetail;

/// Runs mutating actions serially with snapshot capture and rollback
pub struct BatchExecutor<'a> {
    mutator: &'a dyn Mutator,
    journal: &'a dyn SnapshotJournal,
}

impl<'a> BatchExecutor<'a> {
    /// Create an executor over a mutator and a snapshot journal
    #[must_use]
    pub fn new(mutator: &'a dyn Mutator, journal: &'a dyn SnapshotJournal) -> Self {
        Self { mutator, journal }
    }

    /// Execute `actions` in declared order under `policy`.
    ///
    /// Under `RollbackOnFirstFailure` the batch ends with every action
    /// applied, with none applied, or as `RollbackIncomplete`.
    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    pub async fn execute(&self, actions: &[MutatingAction], policy: RollbackPolicy) -> BatchResult {
        let mut stack = RollbackSnapshot::new();
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for action in actions {
            match self.apply_one(action, &mut stack).await {
                Ok(()) => applied.push(action.operation_id.clone()),
                Err(e) => {
                    warn!(operation_id = %action.operation_id, error = %e, "Mutating action failed");
                    failed.push(FailureDetail::new(
                        action.operation_id.clone(),
                        e.kind(),
                        e.to_string(),
                    ));
                    if policy == RollbackPolicy::RollbackOnFirstFailure {
                        return self.abort(policy, stack, failed).await;
                    }
                }
            }
        }

        let status = if failed.is_empty() {
            BatchStatus::AllApplied
        } else {
            BatchStatus::PartialSuccess
        };
        info!(applied = applied.len(), failed = failed.len(), ?status, "Mutating batch finished");

        BatchResult {
            policy,
            status,
            applied,
            failed,
            rolled_back: Vec::new(),
            snapshots: stack.entries().to_vec(),
        }
    }

    async fn apply_one(
        &self,
        action: &MutatingAction,
        stack: &mut RollbackSnapshot,
    ) -> Result<(), RollbackError> {
        let prior_state = self.mutator.capture(action).await?;
        stack.push(SnapshotEntry {
            operation_id: action.operation_id.clone(),
            resource: action.resource.clone(),
            prior_state,
            captured_at: Utc::now(),
        });
        if let Err(e) = self.journal.persist(stack) {
            stack.pop();
            return Err(e);
        }

        debug!(operation_id = %action.operation_id, resource = %action.resource, "Applying action");
        if let Err(e) = self.mutator.apply(action).await {
            stack.pop();
            if let Err(journal_err) = self.journal.persist(stack) {
                warn!(error = %journal_err, "Failed to drop snapshot of failed action");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn abort(
        &self,
        policy: RollbackPolicy,
        mut stack: RollbackSnapshot,
        failed: Vec<FailureDetail>,
    ) -> BatchResult {
        info!(snapshots = stack.len(), "Rolling back mutating batch");
        let rolled_back = revert(self.mutator, &mut stack).await;

        let status = if stack.is_empty() {
            self.journal.discard();
            BatchStatus::RolledBack
        } else {
            if let Err(e) = self.journal.persist(&stack) {
                warn!(error = %e, "Failed to persist unreverted snapshots");
            }
            BatchStatus::RollbackIncomplete
        };

        BatchResult {
            policy,
            status,
            applied: stack
                .entries()
                .iter()
                .map(|e| e.operation_id.clone())
                .collect(),
            failed,
            rolled_back,
            snapshots: stack.entries().to_vec(),
        }
    }
}

/// Revert every snapshot in strict reverse order.
///
/// Each revert is recorded independently; entries that could not be restored
/// stay in `snapshot` (in capture order) for manual remediation.
pub async fn revert(mutator: &dyn Mutator, snapshot: &mut RollbackSnapshot) -> Vec<RollbackOutcome> {
    let mut outcomes = Vec::with_capacity(snapshot.len());
    let mut unreverted = Vec::new();

    while let Some(entry) = snapshot.pop() {
        let outcome = revert_entry(mutator, &entry).await;
        if !outcome.reverted {
            unreverted.push(entry);
        }
        outcomes.push(outcome);
    }

    for entry in unreverted.into_iter().rev() {
        snapshot.push(entry);
    }
    outcomes
}

pub(crate) async fn revert_entry(mutator: &dyn Mutator, entry: &SnapshotEntry) -> RollbackOutcome {
    match mutator.restore(entry).await {
        Ok(()) => {
            debug!(operation_id = %entry.operation_id, resource = %entry.resource, "Reverted");
            RollbackOutcome {
                operation_id: entry.operation_id.clone(),
                resource: entry.resource.clone(),
                reverted: true,
                error: None,
            }
        }
        Err(e) => {
            warn!(operation_id = %entry.operation_id, resource = %entry.resource, error = %e, "Revert failed");
            RollbackOutcome {
                operation_id: entry.operation_id.clone(),
                resource: entry.resource.clone(),
                reverted: false,
                error: Some(e.to_string()),
            }
        }
    }
}
