//! Plan execution
//!
//! The scheduler dispatches every step whose dependencies are done, records
//! outcomes as they arrive, and applies the run-level policies:
//! - a failed dependency skips its dependents (best-effort ones run degraded)
//! - cancellation stops dispatch and lets in-flight steps finish
//! - a failed mutating step under fail-fast reverts every applied mutation

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::config::ConversationContext;
use super::core::Orchestrator;
use super::dispatch::StepOutcome;
use super::types::{ExecutionRun, RollbackSummary, RunState, StepState};
use crate::audit::{AuditEvent, AuditEventKind};
use crate::event_bus::OrchestratorEvent;
use crate::plan::{FailurePolicy, Plan, Step, StepId};
use crate::rollback::{revert_entry, RollbackOutcome, SnapshotEntry};

/// Readiness of a pending step
enum Readiness {
    /// Some dependency is still pending or running
    Waiting,
    /// Every dependency satisfied
    Ready,
    /// Some dependencies failed; the step runs with degraded input
    Degraded(Vec<StepId>),
    /// Some dependencies failed; the step will not run
    Blocked(Vec<StepId>),
}

fn readiness(plan: &Plan, run: &ExecutionRun, step: &Step) -> Readiness {
    let failed: Vec<StepId> = step
        .depends_on
        .iter()
        .filter(|dep| {
            let state = run.step_state(dep);
            state.is_terminal() && !state.satisfies_dependents()
        })
        .cloned()
        .collect();
    let all_done = step
        .depends_on
        .iter()
        .all(|dep| run.step_state(dep).is_terminal());

    let best_effort = plan.is_best_effort(step.capability);
    match (failed.is_empty(), all_done) {
        (true, true) => Readiness::Ready,
        (true, false) => Readiness::Waiting,
        (false, _) if !best_effort => Readiness::Blocked(failed),
        (false, true) => Readiness::Degraded(failed),
        (false, false) => Readiness::Waiting,
    }
}

impl Orchestrator {
    /// Execute a plan to a terminal state.
    ///
    /// The run can be cancelled through [`Orchestrator::cancel`] while it is
    /// active.
    pub async fn execute(&self, plan: &Plan, conversation: &ConversationContext) -> ExecutionRun {
        self.execute_with_cancel(plan, conversation, CancellationToken::new())
            .await
    }

    /// Execute a plan, stopping dispatch once `cancel` fires
    #[instrument(skip_all, fields(plan_id = %plan.id(), conversation_id = %conversation.conversation_id))]
    pub async fn execute_with_cancel(
        &self,
        plan: &Plan,
        conversation: &ConversationContext,
        cancel: CancellationToken,
    ) -> ExecutionRun {
        let mut run = ExecutionRun::new(plan, conversation.conversation_id.clone());
        let run_id = run.id;
        let cancel = cancel.child_token();
        self.active_runs.insert(run_id, cancel.clone());

        run.state = RunState::Running;
        info!(run_id = %run_id, steps = plan.steps().len(), kind = ?plan.kind(), "Run started");
        self.emit(OrchestratorEvent::RunStarted {
            run_id,
            plan_id: plan.id(),
            conversation_id: conversation.conversation_id.clone(),
            steps: plan.steps().len(),
        });
        self.audit(
            AuditEvent::new(run_id, AuditEventKind::RunStarted)
                .with_payload(&serde_json::to_value(plan).unwrap_or_default()),
        )
        .await;

        let mut in_flight = FuturesUnordered::new();
        let mut journal: Vec<(StepId, SnapshotEntry)> = Vec::new();
        let mut unreverted: Vec<String> = Vec::new();
        let mut rollback_requested = false;

        loop {
            for step_id in plan.topological_order() {
                let Some(step) = plan.step(step_id) else {
                    continue;
                };
                if run.step_state(step_id) != StepState::Pending {
                    continue;
                }

                let missing = match readiness(plan, &run, step) {
                    Readiness::Waiting => continue,
                    Readiness::Blocked(failed) => {
                        self.skip_step(run_id, &mut run, step, failed).await;
                        continue;
                    }
                    Readiness::Ready => Vec::new(),
                    Readiness::Degraded(failed) => failed,
                };
                if cancel.is_cancelled() || rollback_requested {
                    continue;
                }

                self.mark_dispatched(run_id, &mut run, step, &missing).await;
                in_flight.push(self.run_step(run_id, plan, step, conversation, missing));
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };

            let Some(step) = plan.step(&outcome.step_id) else {
                continue;
            };
            let mutation_failed = step.is_mutating() && outcome.result.failure_kind().is_some();
            self.record_outcome(run_id, &mut run, step, outcome, &mut journal, &mut unreverted)
                .await;

            if mutation_failed
                && plan.failure_policy() == FailurePolicy::FailFast
                && !rollback_requested
            {
                warn!(run_id = %run_id, "Mutating step failed under fail-fast, rolling back run");
                rollback_requested = true;
            }
        }

        let cancelled_steps = self.cancel_pending(run_id, &mut run).await;
        if cancel.is_cancelled() {
            run.cancelled = true;
            info!(run_id = %run_id, cancelled_steps, "Run cancelled");
            self.emit(OrchestratorEvent::RunCancelled {
                run_id,
                cancelled_steps,
            });
        }

        if rollback_requested {
            let summary = self
                .rollback_run(run_id, &mut run, plan, journal, unreverted)
                .await;
            run.rollback = Some(summary);
        }
        run.state = if rollback_requested {
            RunState::RolledBack
        } else if run.steps.iter().all(|s| s.state == StepState::Succeeded) {
            RunState::Completed
        } else {
            RunState::CompletedWithFailures
        };

        if !run.is_rollback_incomplete() {
            for step in plan.steps().iter().filter(|s| s.is_mutating()) {
                self.store.remove(&self.snapshot_key(conversation, step));
            }
        }

        self.finish(run_id, &mut run).await;
        self.active_runs.remove(&run_id);
        run
    }

    async fn skip_step(&self, run_id: Uuid, run: &mut ExecutionRun, step: &Step, failed: Vec<StepId>) {
        info!(run_id = %run_id, step_id = %step.id, ?failed, "Skipping step, dependency failed");
        if let Some(record) = run.step_mut(&step.id) {
            record.state = StepState::Skipped;
            record.failed_dependencies = failed.clone();
        }
        self.emit(OrchestratorEvent::StepSkipped {
            run_id,
            step_id: step.id.clone(),
            failed_dependencies: failed,
        });
        self.audit(
            AuditEvent::new(run_id, AuditEventKind::StepSkipped)
                .with_step(step.id.clone(), step.capability)
                .with_status(StepState::Skipped.as_str()),
        )
        .await;
    }

    async fn mark_dispatched(
        &self,
        run_id: Uuid,
        run: &mut ExecutionRun,
        step: &Step,
        missing: &[StepId],
    ) {
        let degraded = !missing.is_empty();
        if degraded {
            info!(run_id = %run_id, step_id = %step.id, ?missing, "Dispatching best-effort step degraded");
        }
        if let Some(record) = run.step_mut(&step.id) {
            record.state = StepState::Running;
            record.degraded = degraded;
            record.failed_dependencies = missing.to_vec();
        }
        self.emit(OrchestratorEvent::StepDispatched {
            run_id,
            step_id: step.id.clone(),
            capability: step.capability,
            degraded,
        });
        self.audit(
            AuditEvent::new(run_id, AuditEventKind::StepDispatched)
                .with_step(step.id.clone(), step.capability)
                .with_payload(&step.input),
        )
        .await;
    }

    async fn record_outcome(
        &self,
        run_id: Uuid,
        run: &mut ExecutionRun,
        step: &Step,
        outcome: StepOutcome,
        journal: &mut Vec<(StepId, SnapshotEntry)>,
        unreverted: &mut Vec<String>,
    ) {
        let StepOutcome {
            step_id,
            result,
            attempts,
            duration_ms,
            snapshots,
            unreverted: step_unreverted,
            remediation,
        } = outcome;

        let status = match result.failure_kind() {
            Some(kind) => format!("{}:{}", result.status(), kind),
            None => result.status().to_string(),
        };

        self.emit(OrchestratorEvent::StepCompleted {
            run_id,
            step_id: step_id.clone(),
            capability: step.capability,
            status: result.status().to_string(),
            duration_ms,
        });
        self.audit(
            AuditEvent::new(run_id, AuditEventKind::StepCompleted)
                .with_step(step_id.clone(), step.capability)
                .with_payload(&serde_json::to_value(&result).unwrap_or_default())
                .with_status(status),
        )
        .await;

        journal.extend(snapshots.into_iter().map(|entry| (step_id.clone(), entry)));
        unreverted.extend(step_unreverted);

        if let Some(record) = run.step_mut(&step_id) {
            record.state = StepState::from_result(&result);
            record.result = Some(result);
            record.attempts = attempts;
            record.duration_ms = duration_ms;
            record.remediation = remediation;
        }
    }

    /// Mark every step that never started as cancelled
    async fn cancel_pending(&self, run_id: Uuid, run: &mut ExecutionRun) -> usize {
        let mut cancelled = Vec::new();
        for record in run.steps.iter_mut().filter(|s| s.state == StepState::Pending) {
            record.state = StepState::Cancelled;
            cancelled.push((record.step_id.clone(), record.capability));
        }
        for (step_id, capability) in &cancelled {
            self.audit(
                AuditEvent::new(run_id, AuditEventKind::StepSkipped)
                    .with_step(step_id.clone(), *capability)
                    .with_status(StepState::Cancelled.as_str()),
            )
            .await;
        }
        cancelled.len()
    }

    /// Revert every applied mutation of the run, newest first
    async fn rollback_run(
        &self,
        run_id: Uuid,
        run: &mut ExecutionRun,
        plan: &Plan,
        journal: Vec<(StepId, SnapshotEntry)>,
        mut unreverted: Vec<String>,
    ) -> RollbackSummary {
        info!(run_id = %run_id, snapshots = journal.len(), "Run rollback started");
        self.emit(OrchestratorEvent::RollbackStarted {
            run_id,
            snapshots: journal.len(),
        });
        self.audit(
            AuditEvent::new(run_id, AuditEventKind::RollbackStarted)
                .with_status(journal.len().to_string()),
        )
        .await;

        let mut outcomes = Vec::with_capacity(journal.len());
        for (step_id, entry) in journal.into_iter().rev() {
            let worker = plan
                .step(&step_id)
                .and_then(|step| self.workers.get(step.capability));
            let outcome = match worker.as_ref().and_then(|w| w.mutator()) {
                Some(mutator) => revert_entry(mutator, &entry).await,
                None => RollbackOutcome {
                    operation_id: entry.operation_id.clone(),
                    resource: entry.resource.clone(),
                    reverted: false,
                    error: Some(format!("no mutator available for step '{}'", step_id)),
                },
            };

            if outcome.reverted {
                if let Some(record) = run.step_mut(&step_id) {
                    record.rolled_back = true;
                }
            } else {
                unreverted.push(outcome.resource.clone());
            }
            outcomes.push(outcome);
        }

        let summary = RollbackSummary {
            outcomes,
            unreverted,
        };
        if summary.is_complete() {
            info!(run_id = %run_id, reverted = summary.reverted(), "Run rollback completed");
        } else {
            warn!(
                run_id = %run_id,
                reverted = summary.reverted(),
                unreverted = ?summary.unreverted,
                "Run rollback incomplete, manual remediation required"
            );
        }
        self.emit(OrchestratorEvent::RollbackCompleted {
            run_id,
            reverted: summary.reverted(),
            unreverted: summary.unreverted.clone(),
        });
        self.audit(
            AuditEvent::new(run_id, AuditEventKind::RollbackCompleted)
                .with_payload(&serde_json::to_value(&summary).unwrap_or_default())
                .with_status(if summary.is_complete() {
                    "complete"
                } else {
                    "incomplete"
                }),
        )
        .await;
        summary
    }

    /// Append the final audit event, flush the sink and publish the state.
    ///
    /// A run whose audit trail is not durable is never reported `Completed`.
    async fn finish(&self, run_id: Uuid, run: &mut ExecutionRun) {
        self.audit(
            AuditEvent::new(run_id, AuditEventKind::RunFinished).with_status(run.state.as_str()),
        )
        .await;

        if let Some(sink) = &self.audit {
            if let Err(e) = sink.flush().await {
                warn!(run_id = %run_id, error = %e, "Audit flush failed");
                run.audit_error = Some(e.to_string());
                if run.state == RunState::Completed {
                    run.state = RunState::CompletedWithFailures;
                }
            }
        }

        run.finished_at = Some(Utc::now());
        info!(
            run_id = %run_id,
            state = %run.state,
            succeeded = run.count(StepState::Succeeded),
            failed = run.count(StepState::Failed),
            skipped = run.count(StepState::Skipped),
            "Run finished"
        );
        self.emit(OrchestratorEvent::RunFinished {
            run_id,
            state: run.state,
        });
    }
}
