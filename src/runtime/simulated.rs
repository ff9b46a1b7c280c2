//! Simulated workers
//!
//! Stand-ins for the cloud-facing workers: they read and write the shared
//! context the way the real ones do but never call a cloud API or an LLM.
//! Mutations land in an in-memory resource map.

use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tessera_core::{
    keys, Capability, ContextError, ContextHandle, FailureKind, MutatingAction, Mutator,
    RollbackError, SnapshotEntry, StepResult, Task, Worker, WorkerRegistry,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Which parts of the simulation fail
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Capabilities whose worker reports an outage
    pub capabilities: BTreeSet<Capability>,
    /// Resources whose mutation is rejected
    pub resources: BTreeSet<String>,
}

/// Registry with one simulated worker per capability
pub fn simulated_registry(delay: Duration, faults: &FaultPlan) -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    for capability in Capability::ALL {
        let mut worker = SimulatedWorker::new(capability, delay);
        if faults.capabilities.contains(&capability) {
            worker = worker.with_outage();
        }
        if matches!(capability, Capability::Infrastructure | Capability::Environment) {
            worker = worker.with_mutator(SimulatedMutator::rejecting(faults.resources.clone()));
        }
        registry.register(std::sync::Arc::new(worker));
    }
    registry
}

/// Worker that produces canned output for its capability
pub struct SimulatedWorker {
    capability: Capability,
    delay: Duration,
    outage: bool,
    mutator: Option<SimulatedMutator>,
}

impl SimulatedWorker {
    pub fn new(capability: Capability, delay: Duration) -> Self {
        Self {
            capability,
            delay,
            outage: false,
            mutator: None,
        }
    }

    #[must_use]
    pub fn with_outage(mut self) -> Self {
        self.outage = true;
        self
    }

    #[must_use]
    pub fn with_mutator(mut self, mutator: SimulatedMutator) -> Self {
        self.mutator = Some(mutator);
        self
    }

    fn output(&self, task: &Task, context: &ContextHandle) -> Result<Value, ContextError> {
        match self.capability {
            Capability::Discovery => {
                let inventory = task
                    .input
                    .get("resources")
                    .cloned()
                    .unwrap_or_else(default_inventory);
                publish(context, keys::RESOURCE_INVENTORY, inventory.clone())?;
                Ok(json!({ "resources": inventory }))
            }
            Capability::Compliance => {
                let candidates = task
                    .input
                    .get("candidates")
                    .cloned()
                    .unwrap_or_else(default_candidates);
                let findings: Vec<Value> = candidates
                    .as_array()
                    .map(|items| items.iter().filter_map(|c| c.get("finding").cloned()).collect())
                    .unwrap_or_default();
                publish(context, keys::FINDINGS, json!(findings))?;
                publish(context, keys::REMEDIATION_CANDIDATES, candidates)?;
                Ok(json!({ "findings": findings.len(), "degraded": task.degraded }))
            }
            Capability::Cost => {
                let resources = context
                    .read(keys::RESOURCE_INVENTORY)
                    .and_then(|v| v.as_array().map(Vec::len))
                    .unwrap_or(3);
                let estimate = json!({ "monthly_usd": resources as f64 * 42.5 });
                publish(context, keys::COST_ESTIMATE, estimate.clone())?;
                Ok(estimate)
            }
            Capability::Environment => {
                let state = json!({ "status": "provisioned", "operation_id": task.operation_id });
                publish(context, keys::ENVIRONMENT_STATE, state.clone())?;
                Ok(state)
            }
            Capability::Knowledge => {
                let answer = format!(
                    "Simulated answer drawing on {} context bundle(s)",
                    task.bundles.len()
                );
                publish(context, keys::KNOWLEDGE_ANSWER, json!(answer))?;
                Ok(json!({ "answer": answer }))
            }
            Capability::Infrastructure => Ok(json!({ "templates": 0 })),
        }
    }
}

#[async_trait::async_trait]
impl Worker for SimulatedWorker {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn process(&self, task: &Task, context: &ContextHandle) -> StepResult {
        tokio::time::sleep(self.delay).await;
        if self.outage {
            return StepResult::failure(
                FailureKind::Unavailable,
                format!("simulated outage of {}", self.capability),
            );
        }
        match self.output(task, context) {
            Ok(output) => StepResult::success(output),
            Err(e) => StepResult::failure(FailureKind::InternalError, e.to_string()),
        }
    }

    fn mutator(&self) -> Option<&dyn Mutator> {
        self.mutator.as_ref().map(|m| m as &dyn Mutator)
    }
}

/// Write a key the step declared; undeclared keys (narrowed by a key override) are dropped
fn publish(context: &ContextHandle, key: &str, value: Value) -> Result<(), ContextError> {
    match context.write(key, value) {
        Ok(_) => Ok(()),
        Err(ContextError::UndeclaredWrite { .. }) => {
            debug!(step_id = %context.step_id(), key, "Key not in write set, not published");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn default_inventory() -> Value {
    json!(["vm-web-01", "st-logs-01", "vnet-prod-01"])
}

fn default_candidates() -> Value {
    json!([
        {
            "id": "tag-vm-web",
            "finding": "vm-web-01 is missing the cost-center tag",
            "resource_id": "vm-web-01",
            "resource_kind": "compute",
            "environment": "dev",
            "change": "tagging",
            "proposed_fix": { "tags": { "cost-center": "platform" } }
        },
        {
            "id": "st-logs-https",
            "finding": "st-logs-01 accepts plain http",
            "resource_id": "st-logs-01",
            "resource_kind": "storage",
            "environment": "staging",
            "change": "property",
            "proposed_fix": { "https_only": true }
        },
        {
            "id": "vnet-prod-peering",
            "finding": "vnet-prod-01 has an unused peering to a dev network",
            "resource_id": "vnet-prod-01",
            "resource_kind": "network",
            "environment": "prod",
            "change": "delete",
            "proposed_fix": null
        }
    ])
}

/// In-memory resource map with rejectable resources
#[derive(Debug, Default)]
pub struct SimulatedMutator {
    resources: Mutex<HashMap<String, Value>>,
    applied: Mutex<HashSet<String>>,
    rejected: BTreeSet<String>,
}

impl SimulatedMutator {
    /// Mutator that rejects changes to `rejected`
    pub fn rejecting(rejected: BTreeSet<String>) -> Self {
        Self {
            rejected,
            ..Self::default()
        }
    }

    /// Current state of a resource
    pub async fn state(&self, resource: &str) -> Value {
        self.resources
            .lock()
            .await
            .get(resource)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

#[async_trait::async_trait]
impl Mutator for SimulatedMutator {
    async fn capture(&self, action: &MutatingAction) -> Result<Value, RollbackError> {
        Ok(self.state(&action.resource).await)
    }

    async fn apply(&self, action: &MutatingAction) -> Result<Value, RollbackError> {
        if self.rejected.contains(&action.resource) {
            return Err(RollbackError::Apply {
                operation_id: action.operation_id.clone(),
                kind: FailureKind::Rejected,
                message: format!("simulated rejection of {}", action.resource),
            });
        }
        if !self.applied.lock().await.insert(action.operation_id.clone()) {
            debug!(operation_id = %action.operation_id, "Already applied");
            return Ok(action.change.clone());
        }
        self.resources
            .lock()
            .await
            .insert(action.resource.clone(), action.change.clone());
        Ok(action.change.clone())
    }

    async fn restore(&self, entry: &SnapshotEntry) -> Result<(), RollbackError> {
        self.resources
            .lock()
            .await
            .insert(entry.resource.clone(), entry.prior_state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(resource: &str) -> MutatingAction {
        MutatingAction::new(format!("op-{}", resource), resource, json!({ "size": "D4" }))
    }

    #[tokio::test]
    async fn test_mutator_applies_once_and_restores() {
        let mutator = SimulatedMutator::default();
        let action = action("vm-web-01");

        assert_eq!(mutator.capture(&action).await.unwrap(), Value::Null);
        mutator.apply(&action).await.unwrap();
        mutator.apply(&action).await.unwrap();
        assert_eq!(mutator.state("vm-web-01").await, json!({ "size": "D4" }));

        let entry = SnapshotEntry {
            operation_id: action.operation_id.clone(),
            resource: action.resource.clone(),
            prior_state: json!({ "size": "B2" }),
            captured_at: chrono::Utc::now(),
        };
        mutator.restore(&entry).await.unwrap();
        assert_eq!(mutator.state("vm-web-01").await, json!({ "size": "B2" }));
    }

    #[tokio::test]
    async fn test_rejected_resource_fails_apply() {
        let mutator = SimulatedMutator::rejecting(["st-logs-01".to_string()].into());
        let err = mutator.apply(&action("st-logs-01")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Rejected);
    }

    #[test]
    fn test_registry_covers_every_capability() {
        let faults = FaultPlan {
            capabilities: [Capability::Cost].into(),
            resources: BTreeSet::new(),
        };
        let registry = simulated_registry(Duration::ZERO, &faults);
        assert_eq!(registry.len(), Capability::ALL.len());
        assert!(registry
            .get(Capability::Infrastructure)
            .is_some_and(|w| w.mutator().is_some()));
        assert!(registry
            .get(Capability::Discovery)
            .is_some_and(|w| w.mutator().is_none()));
    }
}
