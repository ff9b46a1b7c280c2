use chrono::Utc;
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use super::graph;
use super::types::{FailurePolicy, Plan, PlanKind, Step};
use crate::capability::Capability;
use crate::planner::PlanningError;

/// Builder for validated [`Plan`]s
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    kind: PlanKind,
    failure_policy: FailurePolicy,
    best_effort: BTreeSet<Capability>,
    steps: Vec<Step>,
}

impl PlanBuilder {
    /// Start a plan of the given kind
    #[must_use]
    pub fn new(kind: PlanKind) -> Self {
        Self {
            kind,
            failure_policy: FailurePolicy::default(),
            best_effort: BTreeSet::new(),
            steps: Vec::new(),
        }
    }

    /// Set the failure policy
    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Mark a capability as best-effort
    #[must_use]
    pub fn best_effort(mut self, capability: Capability) -> Self {
        self.best_effort.insert(capability);
        self
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Validate and freeze the plan
    pub fn build(self) -> Result<Plan, PlanningError> {
        graph::validate_structure(&self.steps)?;
        let order = graph::topological_order(&self.steps)?;
        let ancestors = graph::ancestors(&self.steps, &order);
        graph::check_concurrent_access(&self.steps, &ancestors)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            kind: self.kind,
            failure_policy: self.failure_policy,
            best_effort: self.best_effort,
            steps: self.steps,
            created_at: Utc::now(),
            order,
            ancestors,
        };
        debug!(plan_id = %plan.id, steps = plan.steps.len(), kind = ?plan.kind, "Plan built");
        Ok(plan)
    }
}
