//! Scripted workers and mutators shared by the integration scenarios

#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tessera_core::{
    Capability, ContextHandle, FailureKind, MutatingAction, Mutator, RollbackError,
    SnapshotEntry, StepResult, Task, Worker,
};

/// Tracks how many scripted workers are inside `process` at once
#[derive(Debug, Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Worker whose results are scripted per attempt
pub struct ScriptedWorker {
    capability: Capability,
    script: Mutex<VecDeque<StepResult>>,
    fallback: StepResult,
    delay: Duration,
    writes: Vec<(String, Value)>,
    gauge: Option<Arc<Gauge>>,
    mutator: Option<Arc<MemoryMutator>>,
    tasks: Mutex<Vec<Task>>,
}

impl ScriptedWorker {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            script: Mutex::new(VecDeque::new()),
            fallback: StepResult::success(json!({ "worker": capability.as_str() })),
            delay: Duration::ZERO,
            writes: Vec::new(),
            gauge: None,
            mutator: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt ends with this failure
    pub fn failing(mut self, kind: FailureKind) -> Self {
        self.fallback = StepResult::failure(kind, format!("{} scripted failure", self.capability));
        self
    }

    /// The next attempts return these results, then the fallback
    pub fn then(self, result: StepResult) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write `value` under `key` on every successful attempt
    pub fn writing(mut self, key: &str, value: Value) -> Self {
        self.writes.push((key.to_string(), value));
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn with_mutator(mut self, mutator: Arc<MemoryMutator>) -> Self {
        self.mutator = Some(mutator);
        self
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Worker for ScriptedWorker {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn process(&self, task: &Task, context: &ContextHandle) -> StepResult {
        self.tasks.lock().unwrap().push(task.clone());
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.leave();
        }

        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if result.satisfies_dependents() {
            for (key, value) in &self.writes {
                if let Err(e) = context.write(key, value.clone()) {
                    return StepResult::failure(FailureKind::InternalError, e.to_string());
                }
            }
        }
        result
    }

    fn mutator(&self) -> Option<&dyn Mutator> {
        self.mutator.as_deref().map(|m| m as &dyn Mutator)
    }
}

/// In-memory resources with scripted apply and restore failures
#[derive(Debug, Default)]
pub struct MemoryMutator {
    resources: Mutex<BTreeMap<String, Value>>,
    applied: Mutex<Vec<String>>,
    restored: Mutex<Vec<String>>,
    fail_apply: BTreeSet<String>,
    fail_restore: BTreeSet<String>,
}

impl MemoryMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, name: &str, state: Value) -> Self {
        self.resources.lock().unwrap().insert(name.to_string(), state);
        self
    }

    pub fn failing_apply(mut self, resource: &str) -> Self {
        self.fail_apply.insert(resource.to_string());
        self
    }

    pub fn failing_restore(mut self, resource: &str) -> Self {
        self.fail_restore.insert(resource.to_string());
        self
    }

    pub fn state(&self, resource: &str) -> Value {
        self.resources
            .lock()
            .unwrap()
            .get(resource)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn restored(&self) -> Vec<String> {
        self.restored.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Mutator for MemoryMutator {
    async fn capture(&self, action: &MutatingAction) -> Result<Value, RollbackError> {
        Ok(self.state(&action.resource))
    }

    async fn apply(&self, action: &MutatingAction) -> Result<Value, RollbackError> {
        if self.fail_apply.contains(&action.resource) {
            return Err(RollbackError::Apply {
                operation_id: action.operation_id.clone(),
                kind: FailureKind::Rejected,
                message: format!("{} is locked", action.resource),
            });
        }
        let mut applied = self.applied.lock().unwrap();
        if !applied.contains(&action.operation_id) {
            applied.push(action.operation_id.clone());
            self.resources
                .lock()
                .unwrap()
                .insert(action.resource.clone(), action.change.clone());
        }
        Ok(action.change.clone())
    }

    async fn restore(&self, entry: &SnapshotEntry) -> Result<(), RollbackError> {
        if self.fail_restore.contains(&entry.resource) {
            return Err(RollbackError::Restore {
                resource: entry.resource.clone(),
                message: "restore api unavailable".to_string(),
            });
        }
        self.resources
            .lock()
            .unwrap()
            .insert(entry.resource.clone(), entry.prior_state.clone());
        self.restored.lock().unwrap().push(entry.resource.clone());
        Ok(())
    }
}

/// Candidates scoring 15 (auto), 45 (confirm) and 85 (delegate)
pub fn mixed_risk_candidates() -> Value {
    json!([
        {
            "id": "tag-diag",
            "finding": "diagnostic setting missing owner tag",
            "resource_id": "diag-dev-01",
            "resource_kind": "monitoring",
            "environment": "dev",
            "change": "tagging",
            "proposed_fix": { "tags": { "owner": "platform" } }
        },
        {
            "id": "https-only",
            "finding": "storage account allows http",
            "resource_id": "st-staging-01",
            "resource_kind": "storage",
            "environment": "staging",
            "change": "property",
            "proposed_fix": { "https_only": true }
        },
        {
            "id": "open-vnet",
            "finding": "unused peered vnet exposes prod subnet",
            "resource_id": "vnet-prod-01",
            "resource_kind": "network",
            "environment": "prod",
            "change": "delete",
            "proposed_fix": null
        }
    ])
}
