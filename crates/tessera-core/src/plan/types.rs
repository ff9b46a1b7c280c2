use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::capability::Capability;
use crate::rollback::RollbackPolicy;

/// Step identifier, unique within a plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Create a step ID
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the orchestrator runs a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Call the worker's `process` (read-only or self-contained work)
    #[default]
    Process,
    /// Run the `actions` listed in the step input as a snapshot-backed batch
    MutatingBatch,
    /// Classify and route remediation candidates, auto-executing the safe ones
    Remediate,
}

/// A single worker invocation with declared dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step ID
    pub id: StepId,
    /// Worker capability that executes the step
    pub capability: Capability,
    /// Execution mode
    #[serde(default)]
    pub action: StepAction,
    /// Input payload handed to the worker
    #[serde(default)]
    pub input: serde_json::Value,
    /// Upstream steps that must finish first
    #[serde(default)]
    pub depends_on: BTreeSet<StepId>,
    /// Shared-context keys the step reads
    #[serde(default)]
    pub reads: BTreeSet<String>,
    /// Shared-context keys the step writes
    #[serde(default)]
    pub writes: BTreeSet<String>,
}

impl Step {
    /// Create a read-only step with an empty input
    #[must_use]
    pub fn new(id: impl Into<StepId>, capability: Capability) -> Self {
        Self {
            id: id.into(),
            capability,
            action: StepAction::Process,
            input: serde_json::Value::Object(serde_json::Map::new()),
            depends_on: BTreeSet::new(),
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
        }
    }

    /// Set the execution mode
    #[must_use]
    pub fn with_action(mut self, action: StepAction) -> Self {
        self.action = action;
        self
    }

    /// Set the input payload
    #[must_use]
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    /// Add a dependency
    #[must_use]
    pub fn depends_on(mut self, step: impl Into<StepId>) -> Self {
        self.depends_on.insert(step.into());
        self
    }

    /// Declare a read key
    #[must_use]
    pub fn reads(mut self, key: impl Into<String>) -> Self {
        self.reads.insert(key.into());
        self
    }

    /// Declare a write key
    #[must_use]
    pub fn writes(mut self, key: impl Into<String>) -> Self {
        self.writes.insert(key.into());
        self
    }

    /// Whether the step mutates resources
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self.action, StepAction::Process)
    }
}

/// Shape of a plan, decided by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// One capability, one step
    SingleCapability,
    /// Steps chained one after another
    SequentialMultiCapability,
    /// Independent steps run concurrently
    ParallelMultiCapability,
    /// Assessment followed by risk-routed remediation
    RiskRoutedRemediation,
}

/// What happens to the run when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep going with independent branches; report failures itemized
    #[default]
    Continue,
    /// A failed mutating step rolls back every applied mutation of the run
    FailFast,
}

impl FailurePolicy {
    /// Batch rollback policy implied by this failure policy
    #[must_use]
    pub fn rollback_policy(&self) -> RollbackPolicy {
        match self {
            FailurePolicy::Continue => RollbackPolicy::ContinueOnFailure,
            FailurePolicy::FailFast => RollbackPolicy::RollbackOnFirstFailure,
        }
    }
}

/// Immutable execution plan
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub(super) id: Uuid,
    pub(super) kind: PlanKind,
    pub(super) failure_policy: FailurePolicy,
    pub(super) best_effort: BTreeSet<Capability>,
    pub(super) steps: Vec<Step>,
    pub(super) created_at: DateTime<Utc>,
    #[serde(skip)]
    pub(super) order: Vec<StepId>,
    #[serde(skip)]
    pub(super) ancestors: BTreeMap<StepId, BTreeSet<StepId>>,
}

impl Plan {
    /// Plan ID
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Plan kind
    #[must_use]
    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    /// Failure policy
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Rollback policy for mutating batches of this plan
    #[must_use]
    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.failure_policy.rollback_policy()
    }

    /// Steps in declaration order
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Look up a step
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// When the plan was created
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether a capability runs even when its dependencies failed
    #[must_use]
    pub fn is_best_effort(&self, capability: Capability) -> bool {
        self.best_effort.contains(&capability)
    }

    /// Step IDs in a dependency-respecting order
    #[must_use]
    pub fn topological_order(&self) -> &[StepId] {
        &self.order
    }

    /// Whether `a` is a (transitive) dependency of `b`
    #[must_use]
    pub fn precedes(&self, a: &StepId, b: &StepId) -> bool {
        self.ancestors.get(b).is_some_and(|set| set.contains(a))
    }

    /// Whether two steps may be scheduled at the same time
    #[must_use]
    pub fn concurrent(&self, a: &StepId, b: &StepId) -> bool {
        a != b && !self.precedes(a, b) && !self.precedes(b, a)
    }
}
