//! Step dispatch
//!
//! Runs one step against its worker: concurrency permits, degraded input,
//! prompt optimization for LLM-backed capabilities, per-step timeout and
//! retry. Mutating batches and remediation steps take their own paths.

use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::config::ConversationContext;
use super::core::Orchestrator;
use crate::capability::Capability;
use crate::context::ContextHandle;
use crate::error::Error;
use crate::event_bus::OrchestratorEvent;
use crate::optimizer::ContentBundle;
use crate::plan::{Plan, Step, StepAction, StepId};
use crate::retry::retry_step;
use crate::risk::RemediationReport;
use crate::rollback::{BatchExecutor, BatchResult, MutatingAction, SnapshotEntry};
use crate::worker::{FailureKind, StepResult, Task, Worker};

/// Priority of optional read-key bundles relative to each other
const READ_BUNDLE_PRIORITY: u8 = 1;

/// What a finished step hands back to the scheduler
#[derive(Debug)]
pub(crate) struct StepOutcome {
    pub step_id: StepId,
    pub result: StepResult,
    pub attempts: u32,
    pub duration_ms: u64,
    /// Snapshots of mutations still in effect, in apply order
    pub snapshots: Vec<SnapshotEntry>,
    /// Resources a batch-level rollback failed to restore
    pub unreverted: Vec<String>,
    pub remediation: Option<RemediationReport>,
}

impl StepOutcome {
    pub(crate) fn new(step_id: StepId, result: StepResult, attempts: u32) -> Self {
        Self {
            step_id,
            result,
            attempts,
            duration_ms: 0,
            snapshots: Vec::new(),
            unreverted: Vec::new(),
            remediation: None,
        }
    }
}

impl Orchestrator {
    /// Run one step to a result
    #[instrument(skip_all, fields(run_id = %run_id, step_id = %step.id, capability = %step.capability))]
    pub(crate) async fn run_step(
        &self,
        run_id: Uuid,
        plan: &Plan,
        step: &Step,
        conversation: &ConversationContext,
        missing: Vec<StepId>,
    ) -> StepOutcome {
        let started = Instant::now();

        let mut outcome = match self.workers.get(step.capability) {
            None => StepOutcome::new(
                step.id.clone(),
                StepResult::failure(
                    FailureKind::Unavailable,
                    format!("no worker registered for capability '{}'", step.capability),
                ),
                1,
            ),
            Some(worker) => {
                let _permits = self.acquire_permits(step.capability).await;
                match step.action {
                    StepAction::Process => {
                        self.process_with_retry(run_id, step, worker.as_ref(), conversation, &missing)
                            .await
                    }
                    StepAction::MutatingBatch => {
                        self.run_mutating_batch(plan, step, worker.as_ref(), conversation, &missing)
                            .await
                    }
                    StepAction::Remediate => {
                        self.run_remediation(run_id, plan, step, worker.as_ref(), conversation)
                            .await
                    }
                }
            }
        };

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            status = outcome.result.status(),
            attempts = outcome.attempts,
            duration_ms = outcome.duration_ms,
            "Step finished"
        );
        outcome
    }

    /// Hold the per-capability and global permits for the duration of a step
    ///
    /// The capability permit comes first so a step queued behind its own
    /// capability's cap never holds a global slot other capabilities could use.
    async fn acquire_permits(
        &self,
        capability: Capability,
    ) -> (Option<OwnedSemaphorePermit>, Option<OwnedSemaphorePermit>) {
        let scoped = match self.capability_limits.get(&capability) {
            Some(limit) => limit.clone().acquire_owned().await.ok(),
            None => None,
        };
        let global = match &self.global_limit {
            Some(limit) => limit.clone().acquire_owned().await.ok(),
            None => None,
        };
        (scoped, global)
    }

    async fn process_with_retry(
        &self,
        run_id: Uuid,
        step: &Step,
        worker: &dyn Worker,
        conversation: &ConversationContext,
        missing: &[StepId],
    ) -> StepOutcome {
        let timeout = self.config.timeout_for(step.capability);

        let (result, attempts) = retry_step(
            &self.config.retry,
            move |attempt| self.attempt(run_id, step, worker, conversation, missing, timeout, attempt),
            |attempt, kind, delay| {
                self.emit(OrchestratorEvent::StepRetrying {
                    run_id,
                    step_id: step.id.clone(),
                    attempt,
                    kind,
                    delay_ms: delay.as_millis() as u64,
                });
            },
        )
        .await;

        StepOutcome::new(step.id.clone(), result, attempts)
    }

    /// One worker invocation under the step timeout
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        run_id: Uuid,
        step: &Step,
        worker: &dyn Worker,
        conversation: &ConversationContext,
        missing: &[StepId],
        timeout: Duration,
        attempt: u32,
    ) -> StepResult {
        let handle = self.store.handle(
            conversation.conversation_id.clone(),
            step.id.clone(),
            step.writes.clone(),
        );

        let mut task = Task::new(
            run_id,
            step.id.clone(),
            step.capability,
            conversation.conversation_id.clone(),
            step.input.clone(),
        );
        if !missing.is_empty() {
            task = task.degraded(missing.to_vec());
        }
        task.attempt = attempt;

        if self.config.is_llm_backed(step.capability) {
            match self.optimize_prompt(step, &task, &handle) {
                Ok(bundles) => task = task.with_bundles(bundles),
                Err(result) => return result,
            }
        }

        match tokio::time::timeout(timeout, worker.process(&task, &handle)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    step_id = %step.id,
                    attempt,
                    timeout_ms = timeout.as_millis() as u64,
                    "Step timed out"
                );
                StepResult::failure(
                    FailureKind::Timeout,
                    format!(
                        "step '{}' exceeded its {}ms timeout",
                        step.id,
                        timeout.as_millis()
                    ),
                )
            }
        }
    }

    /// Fit the step input and its declared reads into the token budget
    fn optimize_prompt(
        &self,
        step: &Step,
        task: &Task,
        handle: &ContextHandle,
    ) -> Result<Vec<ContentBundle>, StepResult> {
        let mut bundles = vec![ContentBundle::required("input", task.input.to_string())];
        for key in &step.reads {
            if let Some(value) = handle.read(key) {
                bundles.push(ContentBundle::new(
                    key.clone(),
                    value.to_string(),
                    READ_BUNDLE_PRIORITY,
                ));
            }
        }

        match self.optimizer.optimize(bundles, self.config.token_budget) {
            Ok(bundles) => Ok(bundles),
            Err(e @ Error::ContextTooLarge { .. }) => {
                warn!(step_id = %step.id, error = %e, "Prompt context over budget");
                Err(StepResult::failure(FailureKind::ContextTooLarge, e.to_string()))
            }
            Err(e) => Err(StepResult::failure(FailureKind::InternalError, e.to_string())),
        }
    }

    /// Run the `actions` of a step as a snapshot-backed batch.
    ///
    /// Not retried and not wrapped in the step timeout: an abandoned batch
    /// would leave mutations without a recorded outcome.
    async fn run_mutating_batch(
        &self,
        plan: &Plan,
        step: &Step,
        worker: &dyn Worker,
        conversation: &ConversationContext,
        missing: &[StepId],
    ) -> StepOutcome {
        let declared = if missing.is_empty() {
            step.input.get("actions")
        } else {
            None
        };
        let actions: Vec<MutatingAction> = match declared {
            None => Vec::new(),
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(actions) => actions,
                Err(e) => {
                    return StepOutcome::new(
                        step.id.clone(),
                        StepResult::failure(
                            FailureKind::Rejected,
                            format!("invalid actions for step '{}': {}", step.id, e),
                        ),
                        1,
                    )
                }
            },
        };

        let Some(mutator) = worker.mutator() else {
            return StepOutcome::new(
                step.id.clone(),
                StepResult::failure(
                    FailureKind::InternalError,
                    format!("worker '{}' cannot run mutating actions", step.capability),
                ),
                1,
            );
        };

        let journal = self.snapshot_journal(conversation, step);
        let batch = BatchExecutor::new(mutator, &journal)
            .execute(&actions, plan.rollback_policy())
            .await;

        batch_outcome(step, batch)
    }
}

/// Step outcome of a finished batch.
///
/// Snapshots left behind by a failed batch-level rollback are reported as
/// unreverted and not handed to a later run-level rollback.
pub(crate) fn batch_outcome(step: &Step, batch: BatchResult) -> StepOutcome {
    let mut outcome = StepOutcome::new(step.id.clone(), batch.to_step_result(), 1);
    outcome.unreverted = batch.unreverted();
    if outcome.unreverted.is_empty() {
        outcome.snapshots = batch.snapshots;
    }
    outcome
}
