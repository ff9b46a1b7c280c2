use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::Worker;
use crate::capability::Capability;

/// Registry of workers, one per capability
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<Capability, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, replacing any previous worker for its capability
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        let capability = worker.capability();
        debug!(capability = %capability, "Registering worker");
        self.workers.insert(capability, worker);
    }

    /// Builder-style registration
    #[must_use]
    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.register(worker);
        self
    }

    /// Get the worker for a capability
    #[must_use]
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn Worker>> {
        self.workers.get(&capability).cloned()
    }

    /// Check if a capability has a worker
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.workers.contains_key(&capability)
    }

    /// Capabilities with a registered worker
    #[must_use]
    pub fn available(&self) -> BTreeSet<Capability> {
        self.workers.keys().copied().collect()
    }

    /// Number of registered workers
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("capabilities", &self.available())
            .finish()
    }
}
