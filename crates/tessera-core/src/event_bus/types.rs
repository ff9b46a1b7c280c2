use serde::Serialize;
use uuid::Uuid;

use crate::capability::Capability;
use crate::orchestrator::RunState;
use crate::plan::StepId;
use crate::worker::FailureKind;

/// Events emitted while a plan executes.
///
/// Payloads are never included; subscribers fetch results from the
/// [`ExecutionRun`](crate::orchestrator::ExecutionRun).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// Run started
    RunStarted {
        /// Run identifier
        run_id: Uuid,
        /// Plan being executed
        plan_id: Uuid,
        /// Conversation scope
        conversation_id: String,
        /// Number of steps in the plan
        steps: usize,
    },
    /// Step handed to its worker
    StepDispatched {
        /// Run identifier
        run_id: Uuid,
        /// Step identifier
        step_id: StepId,
        /// Worker capability
        capability: Capability,
        /// Running with degraded input
        degraded: bool,
    },
    /// Step failed transiently and will be retried
    StepRetrying {
        /// Run identifier
        run_id: Uuid,
        /// Step identifier
        step_id: StepId,
        /// Attempt that failed
        attempt: u32,
        /// Why it failed
        kind: FailureKind,
        /// Backoff before the next attempt
        delay_ms: u64,
    },
    /// Step reached a result
    StepCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Step identifier
        step_id: StepId,
        /// Worker capability
        capability: Capability,
        /// Result status (`success`, `partial_success`, `failure`)
        status: String,
        /// Execution duration in milliseconds
        duration_ms: u64,
    },
    /// Step will not run because a dependency failed
    StepSkipped {
        /// Run identifier
        run_id: Uuid,
        /// Step identifier
        step_id: StepId,
        /// Failed upstream steps
        failed_dependencies: Vec<StepId>,
    },
    /// A remediation candidate was handed to a human
    ConfirmationRequired {
        /// Run identifier
        run_id: Uuid,
        /// Confirmation request ID
        request_id: Uuid,
        /// Candidate awaiting confirmation
        candidate_id: String,
    },
    /// Run-level rollback started
    RollbackStarted {
        /// Run identifier
        run_id: Uuid,
        /// Snapshots to revert
        snapshots: usize,
    },
    /// Run-level rollback finished
    RollbackCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Snapshots restored
        reverted: usize,
        /// Resources that could not be restored
        unreverted: Vec<String>,
    },
    /// Run cancelled between ticks
    RunCancelled {
        /// Run identifier
        run_id: Uuid,
        /// Steps that never started
        cancelled_steps: usize,
    },
    /// Run reached a terminal state
    RunFinished {
        /// Run identifier
        run_id: Uuid,
        /// Terminal state
        state: RunState,
    },
}

impl OrchestratorEvent {
    /// Run this event belongs to
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StepDispatched { run_id, .. }
            | Self::StepRetrying { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::StepSkipped { run_id, .. }
            | Self::ConfirmationRequired { run_id, .. }
            | Self::RollbackStarted { run_id, .. }
            | Self::RollbackCompleted { run_id, .. }
            | Self::RunCancelled { run_id, .. }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }
}
