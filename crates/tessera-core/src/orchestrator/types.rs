//! Execution run record
//!
//! - `RunState` / `StepState` state machines
//! - `StepRecord` per-step progress
//! - `ExecutionRun` the mutable record of one plan's execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::plan::{Plan, PlanKind, StepAction, StepId};
use crate::risk::RemediationReport;
use crate::rollback::RollbackOutcome;
use crate::worker::StepResult;

/// Run state: `Pending → Running → {Completed, CompletedWithFailures, RolledBack}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, not started
    Pending,
    /// Steps are being dispatched
    Running,
    /// Every step succeeded
    Completed,
    /// At least one step failed, was skipped or was cancelled
    CompletedWithFailures,
    /// A mutating step failed under fail-fast and applied mutations were reverted
    RolledBack,
}

impl RunState {
    /// Whether the run has finished
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithFailures | Self::RolledBack
        )
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithFailures => "completed_with_failures",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting for dependencies
    Pending,
    /// Dispatched to its worker
    Running,
    /// Result is `Success`
    Succeeded,
    /// Result is `PartialSuccess`
    PartiallySucceeded,
    /// Result is `Failure`
    Failed,
    /// Not run because a dependency failed
    Skipped,
    /// Not run because the run was cancelled or rolled back
    Cancelled,
}

impl StepState {
    /// State implied by a result
    #[must_use]
    pub fn from_result(result: &StepResult) -> Self {
        match result {
            StepResult::Success { .. } => Self::Succeeded,
            StepResult::PartialSuccess { .. } => Self::PartiallySucceeded,
            StepResult::Failure { .. } => Self::Failed,
        }
    }

    /// Whether the step will not change any more
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Whether dependents may consume this step's output
    #[must_use]
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallySucceeded)
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::PartiallySucceeded => "partially_succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Per-step progress record
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Step ID
    pub step_id: StepId,
    /// Worker capability
    pub capability: Capability,
    /// Execution mode
    pub action: StepAction,
    /// Current state
    pub state: StepState,
    /// Worker result, once recorded
    pub result: Option<StepResult>,
    /// Attempts made
    pub attempts: u32,
    /// Ran with degraded input
    pub degraded: bool,
    /// Upstream steps that failed, were skipped or cancelled
    pub failed_dependencies: Vec<StepId>,
    /// Remediation partition, for remediation steps
    pub remediation: Option<RemediationReport>,
    /// Mutations of this step were reverted by a run-level rollback
    pub rolled_back: bool,
    /// Wall-clock execution time
    pub duration_ms: u64,
}

impl StepRecord {
    pub(crate) fn pending(step: &crate::plan::Step) -> Self {
        Self {
            step_id: step.id.clone(),
            capability: step.capability,
            action: step.action,
            state: StepState::Pending,
            result: None,
            attempts: 0,
            degraded: false,
            failed_dependencies: Vec::new(),
            remediation: None,
            rolled_back: false,
            duration_ms: 0,
        }
    }
}

/// Outcome of a run-level rollback
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackSummary {
    /// Revert outcomes in revert order
    pub outcomes: Vec<RollbackOutcome>,
    /// Resources whose prior state could not be restored
    pub unreverted: Vec<String>,
}

impl RollbackSummary {
    /// Number of snapshots restored
    #[must_use]
    pub fn reverted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.reverted).count()
    }

    /// Whether every snapshot was restored
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unreverted.is_empty()
    }
}

/// Mutable progress record of one plan's execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRun {
    /// Run ID
    pub id: Uuid,
    /// Plan being executed
    pub plan_id: Uuid,
    /// Shape of the plan
    pub plan_kind: PlanKind,
    /// Conversation scope
    pub conversation_id: String,
    /// Current state
    pub state: RunState,
    /// Step records in plan declaration order
    pub steps: Vec<StepRecord>,
    /// Run-level rollback, if one was triggered
    pub rollback: Option<RollbackSummary>,
    /// Cancelled between ticks
    pub cancelled: bool,
    /// Audit sink failure that kept the run from being reported `Completed`
    pub audit_error: Option<String>,
    /// When execution started
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRun {
    /// Create a pending run for a plan
    #[must_use]
    pub fn new(plan: &Plan, conversation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id: plan.id(),
            plan_kind: plan.kind(),
            conversation_id: conversation_id.into(),
            state: RunState::Pending,
            steps: plan.steps().iter().map(StepRecord::pending).collect(),
            rollback: None,
            cancelled: false,
            audit_error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Look up a step record
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&StepRecord> {
        self.steps.iter().find(|s| &s.step_id == id)
    }

    pub(crate) fn step_mut(&mut self, id: &StepId) -> Option<&mut StepRecord> {
        self.steps.iter_mut().find(|s| &s.step_id == id)
    }

    /// State of a step (`Pending` if unknown)
    #[must_use]
    pub fn step_state(&self, id: &StepId) -> StepState {
        self.step(id).map_or(StepState::Pending, |s| s.state)
    }

    /// Number of steps in a state
    #[must_use]
    pub fn count(&self, state: StepState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }

    /// Steps whose result is a failure
    #[must_use]
    pub fn failed_steps(&self) -> Vec<&StepRecord> {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Failed)
            .collect()
    }

    /// Recorded results by step
    #[must_use]
    pub fn results(&self) -> BTreeMap<StepId, StepResult> {
        self.steps
            .iter()
            .filter_map(|s| s.result.clone().map(|r| (s.step_id.clone(), r)))
            .collect()
    }

    /// Remediation reports of the run
    #[must_use]
    pub fn remediation_reports(&self) -> Vec<&RemediationReport> {
        self.steps
            .iter()
            .filter_map(|s| s.remediation.as_ref())
            .collect()
    }

    /// Whether a rollback left resources needing manual remediation
    #[must_use]
    pub fn is_rollback_incomplete(&self) -> bool {
        self.rollback.as_ref().is_some_and(|r| !r.is_complete())
    }

    /// Fatal error carried by the run, if any
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.rollback
            .as_ref()
            .filter(|r| !r.is_complete())
            .map(|r| Error::RollbackIncomplete {
                unreverted: r.unreverted.clone(),
            })
    }

    /// Surface `RollbackIncomplete` as an error
    pub fn into_result(self) -> Result<Self> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}
