//! Planner - classified intent to execution plan conversion
//!
//! The planner picks one of four plan shapes:
//! - single capability
//! - sequential chain (each step depends on the one before it)
//! - parallel fan-out (dependencies derived from shared-context read/write overlap)
//! - risk-routed remediation (assessment feeding a remediation step)
//!
//! Every plan goes through [`PlanBuilder`] validation, so cyclic graphs and
//! concurrent writers of the same key are rejected rather than executed.

use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::capability::{Capability, CapabilityCatalog, CapabilityProfile};
use crate::context::keys;
use crate::intent::Intent;
use crate::plan::{FailurePolicy, Plan, PlanBuilder, PlanKind, Step, StepAction, StepId};

/// Planning errors. All of them are fatal for the request and surfaced to the
/// user as an ambiguous request; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    /// A hint names no known capability
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    /// The capability exists but no worker for it is available
    #[error("capability '{0}' is not available")]
    CapabilityNotAvailable(Capability),

    /// Nothing to do
    #[error("plan has no steps")]
    EmptyPlan,

    /// Two steps share an ID
    #[error("duplicate step '{0}'")]
    DuplicateStep(StepId),

    /// A dependency names a step that is not in the plan
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// Dependent step
        step: StepId,
        /// Missing dependency
        dependency: StepId,
    },

    /// The dependency graph has a cycle
    #[error("dependency cycle through {0:?}")]
    Cycle(Vec<StepId>),

    /// Two concurrently scheduled steps write the same key
    #[error("steps '{first}' and '{second}' may run concurrently but both write {keys:?}")]
    ConflictingWrites {
        /// First writer
        first: StepId,
        /// Second writer
        second: StepId,
        /// Shared keys
        keys: Vec<String>,
    },

    /// A step reads a key written by a step it is not ordered with
    #[error("step '{reader}' reads {keys:?} written by concurrent step '{writer}'")]
    UnorderedReadWrite {
        /// Reading step
        reader: StepId,
        /// Writing step
        writer: StepId,
        /// Shared keys
        keys: Vec<String>,
    },

    /// A control parameter has the wrong shape
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What is wrong with it
        message: String,
    },
}

/// Execution planner
#[derive(Debug, Clone, Default)]
pub struct Planner {
    catalog: CapabilityCatalog,
}

impl Planner {
    /// Create a planner with the default capability catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a planner with a custom catalog
    #[must_use]
    pub fn with_catalog(catalog: CapabilityCatalog) -> Self {
        Self { catalog }
    }

    /// Turn an intent into a validated plan
    #[instrument(skip(self, intent, available), fields(hints = ?intent.capability_hints))]
    pub fn plan(
        &self,
        intent: &Intent,
        available: &BTreeSet<Capability>,
    ) -> Result<Plan, PlanningError> {
        let result = self.plan_inner(intent, available);
        match &result {
            Ok(plan) => info!(
                plan_id = %plan.id(),
                kind = ?plan.kind(),
                steps = plan.steps().len(),
                "Plan created"
            ),
            Err(e) => warn!(error = %e, "Planning failed, treating request as ambiguous"),
        }
        result
    }

    fn plan_inner(
        &self,
        intent: &Intent,
        available: &BTreeSet<Capability>,
    ) -> Result<Plan, PlanningError> {
        let mut capabilities = parse_hints(&intent.capability_hints)?;
        let remediate = intent.flag("remediate");

        if remediate {
            for required in [Capability::Compliance, Capability::Infrastructure] {
                if !capabilities.contains(&required) {
                    capabilities.push(required);
                }
            }
            capabilities.sort_by_key(|c| remediation_rank(*c));
        }

        if capabilities.is_empty() {
            return Err(PlanningError::EmptyPlan);
        }
        if let Some(missing) = capabilities.iter().find(|c| !available.contains(c)) {
            return Err(PlanningError::CapabilityNotAvailable(*missing));
        }

        let kind = if remediate {
            PlanKind::RiskRoutedRemediation
        } else if capabilities.len() == 1 {
            PlanKind::SingleCapability
        } else if mode(intent)? == Some("sequential") {
            PlanKind::SequentialMultiCapability
        } else {
            PlanKind::ParallelMultiCapability
        };

        let default_policy = match kind {
            PlanKind::RiskRoutedRemediation => FailurePolicy::FailFast,
            _ => FailurePolicy::Continue,
        };
        let failure_policy = failure_policy(intent)?.unwrap_or(default_policy);

        let mut steps = Vec::with_capacity(capabilities.len());
        for capability in &capabilities {
            steps.push(self.base_step(intent, *capability, kind)?);
        }

        match kind {
            PlanKind::SingleCapability => {}
            PlanKind::SequentialMultiCapability => {
                for i in 1..steps.len() {
                    let previous = steps[i - 1].id.clone();
                    steps[i].depends_on.insert(previous);
                }
            }
            PlanKind::ParallelMultiCapability | PlanKind::RiskRoutedRemediation => {
                derive_data_dependencies(&mut steps);
            }
        }

        let mut builder = PlanBuilder::new(kind).failure_policy(failure_policy);
        for capability in best_effort(intent)? {
            builder = builder.best_effort(capability);
        }
        for step in steps {
            builder = builder.step(step);
        }
        builder.build()
    }

    fn base_step(
        &self,
        intent: &Intent,
        capability: Capability,
        kind: PlanKind,
    ) -> Result<Step, PlanningError> {
        let profile = profile_with_overrides(self.catalog.profile(capability), intent, capability)?;
        let input = intent
            .parameter("inputs")
            .and_then(|inputs| inputs.get(capability.as_str()))
            .cloned()
            .unwrap_or_else(|| Value::Object(intent.parameters.clone()));

        let remediation_step =
            kind == PlanKind::RiskRoutedRemediation && capability == Capability::Infrastructure;

        let (id, action) = if remediation_step {
            (StepId::from("remediate"), StepAction::Remediate)
        } else if profile.mutating && input.get("actions").is_some_and(Value::is_array) {
            (StepId::from(capability.as_str()), StepAction::MutatingBatch)
        } else {
            (StepId::from(capability.as_str()), StepAction::Process)
        };

        let mut step = Step::new(id, capability)
            .with_action(action)
            .with_input(input);
        step.reads = profile.reads;
        step.writes = profile.writes;
        if remediation_step {
            step.reads.insert(keys::REMEDIATION_CANDIDATES.to_string());
            step.writes.insert(keys::REMEDIATION_RESULTS.to_string());
            step.writes.insert(keys::DELEGATED_REMEDIATIONS.to_string());
        }
        Ok(step)
    }
}

/// Parse hints into capabilities, dropping repeats but keeping first-mention order
fn parse_hints(hints: &[String]) -> Result<Vec<Capability>, PlanningError> {
    let mut capabilities = Vec::new();
    for hint in hints {
        let capability: Capability = hint
            .parse()
            .map_err(|_| PlanningError::UnknownCapability(hint.clone()))?;
        if !capabilities.contains(&capability) {
            capabilities.push(capability);
        }
    }
    Ok(capabilities)
}

/// Discovery feeds assessment, assessment feeds remediation; the rest keep hint order
fn remediation_rank(capability: Capability) -> u8 {
    match capability {
        Capability::Discovery => 0,
        Capability::Compliance => 1,
        Capability::Infrastructure => 2,
        _ => 3,
    }
}

/// A step that reads a key written by another step runs after that step
fn derive_data_dependencies(steps: &mut [Step]) {
    let footprints: Vec<(StepId, BTreeSet<String>)> = steps
        .iter()
        .map(|s| (s.id.clone(), s.writes.clone()))
        .collect();

    for step in steps.iter_mut() {
        for (writer, writes) in &footprints {
            if writer != &step.id && !step.reads.is_disjoint(writes) {
                step.depends_on.insert(writer.clone());
            }
        }
    }
}

fn mode(intent: &Intent) -> Result<Option<&str>, PlanningError> {
    match intent.parameter("mode") {
        None => Ok(None),
        Some(Value::String(m)) if m == "sequential" || m == "parallel" => Ok(Some(m.as_str())),
        Some(other) => Err(PlanningError::InvalidParameter {
            name: "mode".to_string(),
            message: format!("expected \"sequential\" or \"parallel\", got {}", other),
        }),
    }
}

fn failure_policy(intent: &Intent) -> Result<Option<FailurePolicy>, PlanningError> {
    intent
        .parameter("failure_policy")
        .map(|value| {
            serde_json::from_value(value.clone()).map_err(|e| PlanningError::InvalidParameter {
                name: "failure_policy".to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn best_effort(intent: &Intent) -> Result<Vec<Capability>, PlanningError> {
    let Some(value) = intent.parameter("best_effort") else {
        return Ok(Vec::new());
    };
    let names: Vec<String> =
        serde_json::from_value(value.clone()).map_err(|e| PlanningError::InvalidParameter {
            name: "best_effort".to_string(),
            message: e.to_string(),
        })?;
    parse_hints(&names)
}

/// Apply `parameters.keys.<capability>.{reads,writes}` overrides
fn profile_with_overrides(
    mut profile: CapabilityProfile,
    intent: &Intent,
    capability: Capability,
) -> Result<CapabilityProfile, PlanningError> {
    let Some(overrides) = intent
        .parameter("keys")
        .and_then(|keys| keys.get(capability.as_str()))
    else {
        return Ok(profile);
    };

    let parse = |field: &str| -> Result<Option<BTreeSet<String>>, PlanningError> {
        overrides
            .get(field)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| PlanningError::InvalidParameter {
                    name: format!("keys.{}.{}", capability, field),
                    message: e.to_string(),
                })
            })
            .transpose()
    };

    if let Some(reads) = parse("reads")? {
        profile.reads = reads;
    }
    if let Some(writes) = parse("writes")? {
        profile.writes = writes;
    }
    Ok(profile)
}
