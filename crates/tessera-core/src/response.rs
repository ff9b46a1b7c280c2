//! Response synthesis
//!
//! Turns a finished [`ExecutionRun`] into what the caller sees: the terminal
//! state, per-step summaries, and for remediation runs the explicit
//! partition of candidates. A run is only described as successful when every
//! step succeeded.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::capability::Capability;
use crate::error::format_error_for_chat;
use crate::orchestrator::{ExecutionRun, RunState, StepState};
use crate::plan::StepId;
use crate::worker::StepResult;

/// One line per step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    /// Step ID
    pub step_id: StepId,
    /// Worker capability
    pub capability: Capability,
    /// Final state
    pub state: StepState,
    /// Ran with degraded input
    pub degraded: bool,
    /// Mutations reverted by a run-level rollback
    pub rolled_back: bool,
    /// Attempts made
    pub attempts: u32,
    /// Short human-readable detail
    pub detail: String,
}

/// Remediation partition counts across every remediation step of the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemediationCounts {
    /// Fixes applied
    pub auto_executed: usize,
    /// Waiting for a human
    pub awaiting_confirmation: usize,
    /// Handed to template generation
    pub delegated: usize,
    /// Fixes that failed or were rolled back
    pub failed: usize,
}

/// Caller-facing response of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    /// Run ID
    pub run_id: uuid::Uuid,
    /// Terminal state
    pub state: RunState,
    /// Number of steps per state
    pub counts: BTreeMap<&'static str, usize>,
    /// Per-step summaries in plan order
    pub steps: Vec<StepSummary>,
    /// Remediation partition, for remediation runs
    pub remediation: Option<RemediationCounts>,
    /// Resources needing manual intervention after an incomplete rollback
    pub manual_intervention: Vec<String>,
    /// Rendered text
    pub text: String,
}

impl RunResponse {
    /// Build the response of a finished run
    #[must_use]
    pub fn from_run(run: &ExecutionRun) -> Self {
        let mut counts = BTreeMap::new();
        for step in &run.steps {
            *counts.entry(step.state.as_str()).or_insert(0) += 1;
        }

        let steps: Vec<StepSummary> = run
            .steps
            .iter()
            .map(|record| StepSummary {
                step_id: record.step_id.clone(),
                capability: record.capability,
                state: record.state,
                degraded: record.degraded,
                rolled_back: record.rolled_back,
                attempts: record.attempts,
                detail: step_detail(record.state, record.result.as_ref(), &record.failed_dependencies),
            })
            .collect();

        let reports = run.remediation_reports();
        let remediation = (!reports.is_empty()).then(|| {
            reports
                .iter()
                .fold(RemediationCounts::default(), |mut acc, report| {
                    acc.auto_executed += report.auto_executed.len();
                    acc.awaiting_confirmation += report.awaiting_confirmation.len();
                    acc.delegated += report.delegated.len();
                    acc.failed += report.failed.len();
                    acc
                })
        });

        let manual_intervention = run
            .rollback
            .as_ref()
            .map(|r| r.unreverted.clone())
            .unwrap_or_default();

        let mut response = Self {
            run_id: run.id,
            state: run.state,
            counts,
            steps,
            remediation,
            manual_intervention,
            text: String::new(),
        };
        response.text = response.render(run);
        response
    }

    /// Whether every step succeeded
    #[must_use]
    pub fn is_clean_success(&self) -> bool {
        self.state == RunState::Completed
            && self
                .steps
                .iter()
                .all(|s| s.state == StepState::Succeeded && !s.degraded && !s.rolled_back)
    }

    fn render(&self, run: &ExecutionRun) -> String {
        let mut text = String::new();
        let total = self.steps.len();

        let headline = match self.state {
            _ if self.is_clean_success() => {
                format!("✅ Run completed: all {} step(s) succeeded.", total)
            }
            RunState::RolledBack => {
                "↩️ Run rolled back: a mutating step failed and applied changes were reverted."
                    .to_string()
            }
            _ if run.cancelled => format!(
                "⏹️ Run cancelled: {} of {} step(s) never started.",
                self.count(StepState::Cancelled),
                total
            ),
            _ => format!(
                "⚠️ Run completed with failures: {} of {} step(s) succeeded.",
                self.count(StepState::Succeeded),
                total
            ),
        };
        text.push_str(&headline);
        text.push('\n');

        for step in &self.steps {
            let mut flags = Vec::new();
            if step.degraded {
                flags.push("degraded");
            }
            if step.rolled_back {
                flags.push("rolled back");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            let _ = writeln!(
                text,
                "- {} ({}): {}{} {}",
                step.step_id,
                step.capability,
                step.state.as_str(),
                flags,
                step.detail
            );
        }

        if let Some(counts) = &self.remediation {
            let _ = writeln!(
                text,
                "Remediation: {} auto-executed, {} awaiting confirmation, {} delegated to template generation, {} failed.",
                counts.auto_executed, counts.awaiting_confirmation, counts.delegated, counts.failed
            );
        }

        if let Some(error) = run.error() {
            text.push('\n');
            text.push_str(&format_error_for_chat(&error));
            text.push('\n');
        }
        if let Some(audit_error) = &run.audit_error {
            let _ = writeln!(text, "Audit trail could not be flushed: {}", audit_error);
        }

        text
    }

    fn count(&self, state: StepState) -> usize {
        self.counts.get(state.as_str()).copied().unwrap_or(0)
    }
}

fn step_detail(state: StepState, result: Option<&StepResult>, failed_dependencies: &[StepId]) -> String {
    let deps = || {
        failed_dependencies
            .iter()
            .map(StepId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    match (state, result) {
        (StepState::Skipped, _) => format!("(dependency failed: {})", deps()),
        (StepState::Cancelled, _) => "(not started)".to_string(),
        (_, Some(StepResult::Failure { kind, message })) => format!("({}: {})", kind, message),
        (_, Some(StepResult::PartialSuccess { succeeded, failed, .. })) => format!(
            "({} item(s) done, {} failed: {})",
            succeeded.len(),
            failed.len(),
            failed.join(", ")
        ),
        _ if !failed_dependencies.is_empty() => format!("(ran without: {})", deps()),
        _ => String::new(),
    }
}
