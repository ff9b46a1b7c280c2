//! Risk-routed remediation step
//!
//! Reads candidates from the shared context, classifies each one once,
//! routes it, and acts on the partition:
//! - `AutoExecute` candidates run as one snapshot-backed batch
//! - `RequireConfirmation` candidates are submitted to the approval gate
//! - `Delegate` candidates are written out for template generation

use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::config::ConversationContext;
use super::core::Orchestrator;
use super::dispatch::StepOutcome;
use crate::approval::ConfirmationRequest;
use crate::audit::{AuditEvent, AuditEventKind};
use crate::context::{keys, ContextHandle, ContextKey};
use crate::event_bus::OrchestratorEvent;
use crate::plan::{Plan, Step};
use crate::risk::{
    classify_candidate, partition, ClassifiedCandidate, RemediationCandidate, RemediationReport,
    RoutedItem,
};
use crate::rollback::{BatchExecutor, BatchStatus, MutatingAction};
use crate::worker::{FailureDetail, FailureKind, StepResult, Worker};

impl Orchestrator {
    #[instrument(skip_all, fields(run_id = %run_id, step_id = %step.id))]
    pub(crate) async fn run_remediation(
        &self,
        run_id: Uuid,
        plan: &Plan,
        step: &Step,
        worker: &dyn Worker,
        conversation: &ConversationContext,
    ) -> StepOutcome {
        let handle = self.store.handle(
            conversation.conversation_id.clone(),
            step.id.clone(),
            step.writes.clone(),
        );

        let candidates = match self.load_candidates(conversation) {
            Ok(candidates) => candidates,
            Err(result) => return StepOutcome::new(step.id.clone(), result, 1),
        };

        let mut report = RemediationReport::default();
        let mut classified = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let id = candidate.id.clone();
            match classify_candidate(candidate) {
                Ok(c) => classified.push(c),
                Err(e) => {
                    warn!(candidate = %id, error = %e, "Rejected remediation candidate");
                    report
                        .failed
                        .push(FailureDetail::new(id, FailureKind::Rejected, e.to_string()));
                }
            }
        }

        let routed = partition(classified, &self.config.routing);
        info!(
            auto_execute = routed.auto_execute.len(),
            require_confirmation = routed.require_confirmation.len(),
            delegate = routed.delegate.len(),
            "Routed remediation candidates"
        );

        self.request_confirmations(run_id, step, conversation, &routed.require_confirmation, &mut report)
            .await;
        self.delegate(&handle, &routed.delegate, &mut report);

        let mut outcome = StepOutcome::new(step.id.clone(), StepResult::success(serde_json::Value::Null), 1);
        let batch_failure = self
            .auto_execute(plan, step, worker, conversation, &routed.auto_execute, &mut report, &mut outcome)
            .await;

        if let Err(e) = handle.write_as(keys::REMEDIATION_RESULTS, &report) {
            warn!(error = %e, "Failed to write remediation results");
        }

        outcome.result = match batch_failure {
            Some(result) => result,
            None if report.failed.is_empty() => {
                StepResult::success(serde_json::to_value(&report).unwrap_or_default())
            }
            None => {
                let succeeded = report
                    .auto_executed
                    .iter()
                    .chain(&report.awaiting_confirmation)
                    .chain(&report.delegated)
                    .map(|item| item.candidate_id.clone())
                    .collect();
                StepResult::partial(succeeded, report.failed.clone())
            }
        };
        outcome.remediation = Some(report);
        outcome
    }

    /// Candidates written upstream; absence means nothing to remediate
    fn load_candidates(
        &self,
        conversation: &ConversationContext,
    ) -> Result<Vec<RemediationCandidate>, StepResult> {
        let key = ContextKey::new(
            conversation.conversation_id.clone(),
            keys::REMEDIATION_CANDIDATES,
        );
        let Some(entry) = self.store.get(&key) else {
            info!("No remediation candidates in context");
            return Ok(Vec::new());
        };
        serde_json::from_value(entry.value).map_err(|e| {
            StepResult::failure(
                FailureKind::Rejected,
                format!("malformed remediation candidates: {}", e),
            )
        })
    }

    async fn request_confirmations(
        &self,
        run_id: Uuid,
        step: &Step,
        conversation: &ConversationContext,
        candidates: &[ClassifiedCandidate],
        report: &mut RemediationReport,
    ) {
        for classified in candidates {
            let request = ConfirmationRequest::new(
                run_id,
                step.id.clone(),
                conversation.conversation_id.clone(),
                classified,
                self.config.confirmation_timeout_secs,
            );
            let request_id = request.id;
            let candidate_id = classified.candidate().id.clone();

            if let Some(gate) = &self.approval {
                if let Err(e) = gate.submit(request).await {
                    warn!(candidate = %candidate_id, error = %e, "Confirmation request not delivered");
                    report.failed.push(FailureDetail::new(
                        candidate_id,
                        FailureKind::Unavailable,
                        e.to_string(),
                    ));
                    continue;
                }
            }

            self.emit(OrchestratorEvent::ConfirmationRequired {
                run_id,
                request_id,
                candidate_id: candidate_id.clone(),
            });
            self.audit(
                AuditEvent::new(run_id, AuditEventKind::ConfirmationRequested)
                    .with_step(step.id.clone(), step.capability)
                    .with_payload(&serde_json::json!({
                        "request_id": request_id,
                        "candidate_id": candidate_id,
                    }))
                    .with_status(classified.tier().as_str()),
            )
            .await;
            report.awaiting_confirmation.push(RoutedItem::from(classified));
        }
    }

    fn delegate(
        &self,
        handle: &ContextHandle,
        candidates: &[ClassifiedCandidate],
        report: &mut RemediationReport,
    ) {
        if candidates.is_empty() {
            return;
        }
        let delegated: Vec<&RemediationCandidate> =
            candidates.iter().map(ClassifiedCandidate::candidate).collect();
        if let Err(e) = handle.write_as(keys::DELEGATED_REMEDIATIONS, &delegated) {
            warn!(error = %e, "Failed to write delegated remediations");
        }
        report
            .delegated
            .extend(candidates.iter().map(RoutedItem::from));
    }

    /// Apply the auto-execute partition as one batch.
    ///
    /// Returns the failure of a batch that rolled back, which fails the
    /// whole step.
    #[allow(clippy::too_many_arguments)]
    async fn auto_execute(
        &self,
        plan: &Plan,
        step: &Step,
        worker: &dyn Worker,
        conversation: &ConversationContext,
        candidates: &[ClassifiedCandidate],
        report: &mut RemediationReport,
        outcome: &mut StepOutcome,
    ) -> Option<StepResult> {
        if candidates.is_empty() {
            return None;
        }

        let Some(mutator) = worker.mutator() else {
            for classified in candidates {
                report.failed.push(FailureDetail::new(
                    classified.candidate().id.clone(),
                    FailureKind::InternalError,
                    format!("worker '{}' cannot apply fixes", step.capability),
                ));
            }
            return None;
        };

        let mut items: HashMap<String, &ClassifiedCandidate> = HashMap::new();
        let actions: Vec<MutatingAction> = candidates
            .iter()
            .map(|classified| {
                let candidate = classified.candidate();
                let operation_id = format!("{}:{}", step.id, candidate.id);
                items.insert(operation_id.clone(), classified);
                MutatingAction::new(
                    operation_id,
                    candidate.resource_id.clone(),
                    candidate.proposed_fix.clone(),
                )
                .with_description(candidate.finding.clone())
            })
            .collect();

        let journal = self.snapshot_journal(conversation, step);
        let batch = BatchExecutor::new(mutator, &journal)
            .execute(&actions, plan.rollback_policy())
            .await;

        let candidate_id = |operation_id: &str| {
            items
                .get(operation_id)
                .map_or_else(|| operation_id.to_string(), |c| c.candidate().id.clone())
        };

        for operation_id in &batch.applied {
            if let Some(classified) = items.get(operation_id) {
                report.auto_executed.push(RoutedItem::from(*classified));
            }
        }
        for detail in &batch.failed {
            report.failed.push(FailureDetail::new(
                candidate_id(&detail.item),
                detail.kind,
                detail.message.clone(),
            ));
        }
        let trigger = batch.failed.first().map_or(FailureKind::InternalError, |d| d.kind);
        for reverted in batch.rolled_back.iter().filter(|o| o.reverted) {
            report.failed.push(FailureDetail::new(
                candidate_id(&reverted.operation_id),
                trigger,
                "applied, then rolled back",
            ));
        }

        outcome.unreverted = batch.unreverted();
        let failure = matches!(
            batch.status,
            BatchStatus::RolledBack | BatchStatus::RollbackIncomplete
        )
        .then(|| batch.to_step_result());
        if outcome.unreverted.is_empty() {
            outcome.snapshots = batch.snapshots;
        }
        failure
    }
}
