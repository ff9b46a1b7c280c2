//! Runtime wiring
//!
//! Loads configuration and assembles an orchestrator over simulated workers.

pub mod config;
pub mod loader;
pub mod simulated;

pub use config::AppConfig;
pub use loader::load_config;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    spawn_approval_sweeper, spawn_expiry_sweeper, ApprovalQueue, AuditSink, EventBus,
    JsonlAuditSink, MemoryAuditSink, Orchestrator, SharedContextStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use simulated::{simulated_registry, FaultPlan};

/// Orchestrator plus the collaborators the CLI inspects after a run
pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub approvals: Arc<ApprovalQueue>,
    shutdown: CancellationToken,
}

impl Runtime {
    /// Build the runtime for `tessera simulate`
    pub async fn simulated(config: &AppConfig, faults: &FaultPlan) -> Result<Self> {
        let store = Arc::new(SharedContextStore::new());
        let shutdown = CancellationToken::new();
        spawn_expiry_sweeper(Arc::clone(&store), config.context.clone(), shutdown.child_token());

        let audit: Arc<dyn AuditSink> = match &config.audit.path {
            Some(path) => Arc::new(
                JsonlAuditSink::open(path)
                    .await
                    .with_context(|| format!("Failed to open audit log {}", path.display()))?,
            ),
            None => Arc::new(MemoryAuditSink::new()),
        };

        let bus = Arc::new(EventBus::new(config.orchestrator.event_capacity));
        spawn_event_logger(&bus, shutdown.child_token());

        let approvals = Arc::new(ApprovalQueue::with_config(&config.approvals));
        spawn_approval_sweeper(
            Arc::clone(&approvals),
            config.approvals.clone(),
            shutdown.child_token(),
        );
        let registry = simulated_registry(
            Duration::from_millis(config.simulation.step_delay_ms),
            faults,
        );
        info!(workers = registry.len(), "Simulated workers registered");

        let orchestrator = Orchestrator::new(registry, store, config.orchestrator.clone())
            .with_event_bus(bus)
            .with_audit_sink(audit)
            .with_approval_gate(approvals.clone());

        Ok(Self {
            orchestrator,
            approvals,
            shutdown,
        })
    }

    /// Stop the background tasks
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Log every orchestrator event at debug level
fn spawn_event_logger(bus: &EventBus, cancel: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) => debug!(
                        run_id = %event.run_id(),
                        event = %serde_json::to_string(&event).unwrap_or_default(),
                        "Orchestrator event"
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Event logger lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}
