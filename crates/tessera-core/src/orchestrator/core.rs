//! Orchestrator core structure
//!
//! Contains the main `Orchestrator` struct, its builder methods and the
//! request entry points.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use super::config::{ConversationContext, OrchestratorConfig};
use crate::approval::ApprovalGate;
use crate::audit::AuditSink;
use crate::capability::Capability;
use crate::context::SharedContextStore;
use crate::error::Result;
use crate::event_bus::EventBus;
use crate::intent::{Intent, IntentClassifier};
use crate::optimizer::{ContextOptimizer, PriorityTrimmer};
use crate::plan::Plan;
use crate::planner::Planner;
use crate::response::RunResponse;
use crate::worker::WorkerRegistry;

/// Coordinates plan execution across workers
pub struct Orchestrator {
    pub(crate) workers: Arc<WorkerRegistry>,
    pub(crate) store: Arc<SharedContextStore>,
    pub(crate) planner: Planner,
    pub(crate) config: OrchestratorConfig,
    pub(crate) event_bus: Option<Arc<EventBus>>,
    pub(crate) audit: Option<Arc<dyn AuditSink>>,
    pub(crate) approval: Option<Arc<dyn ApprovalGate>>,
    pub(crate) optimizer: Arc<dyn ContextOptimizer>,
    pub(crate) global_limit: Option<Arc<Semaphore>>,
    pub(crate) capability_limits: HashMap<Capability, Arc<Semaphore>>,
    /// Active runs with cancellation tokens
    pub(crate) active_runs: Arc<DashMap<Uuid, CancellationToken>>,
}

impl Orchestrator {
    /// Create a new orchestrator
    #[must_use]
    pub fn new(
        workers: WorkerRegistry,
        store: Arc<SharedContextStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let global_limit =
            (config.max_concurrency > 0).then(|| Arc::new(Semaphore::new(config.max_concurrency)));
        let capability_limits = config
            .capability_concurrency
            .iter()
            .filter(|(_, max)| **max > 0)
            .map(|(capability, max)| (*capability, Arc::new(Semaphore::new(*max))))
            .collect();

        Self {
            workers: Arc::new(workers),
            store,
            planner: Planner::new(),
            config,
            event_bus: None,
            audit: None,
            approval: None,
            optimizer: Arc::new(PriorityTrimmer),
            global_limit,
            capability_limits,
            active_runs: Arc::new(DashMap::new()),
        }
    }

    /// Set the planner
    #[must_use]
    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// Set the event bus for real-time event broadcasting
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Set the audit sink
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Set the gate that receives confirmation requests
    #[must_use]
    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    /// Set the prompt context optimizer
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<dyn ContextOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Get a reference to the event bus (if set)
    #[must_use]
    pub fn event_bus(&self) -> Option<&Arc<EventBus>> {
        self.event_bus.as_ref()
    }

    /// Shared context store used by this orchestrator
    #[must_use]
    pub fn store(&self) -> &Arc<SharedContextStore> {
        &self.store
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Plan an intent against the registered workers
    pub fn plan(&self, intent: &Intent) -> Result<Plan> {
        Ok(self.planner.plan(intent, &self.workers.available())?)
    }

    /// Cancel a running run. In-flight steps finish; nothing new is dispatched.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.active_runs.get(&run_id) {
            Some(token) => {
                token.cancel();
                info!(run_id = %run_id, "Run cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Number of runs currently executing
    #[must_use]
    pub fn active_run_count(&self) -> usize {
        self.active_runs.len()
    }

    /// Classify, plan, execute and render one user request
    #[instrument(skip(self, classifier, user_text, conversation), fields(conversation_id = %conversation.conversation_id))]
    pub async fn handle(
        &self,
        classifier: &dyn IntentClassifier,
        user_text: &str,
        conversation: &ConversationContext,
    ) -> Result<RunResponse> {
        let intent = classifier.classify(user_text, conversation).await?;
        let plan = self.plan(&intent)?;
        let run = self.execute(&plan, conversation).await;
        Ok(RunResponse::from_run(&run))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workers", &self.workers)
            .field("config", &self.config)
            .field("active_runs", &self.active_runs.len())
            .finish()
    }
}
