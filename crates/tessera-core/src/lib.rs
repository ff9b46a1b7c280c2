//! Tessera Core - Multi-Agent Orchestration Engine
//!
//! This crate provides the coordination core for Tessera's cloud-operations
//! workers, including:
//! - Planning: Converting classified intents into validated step graphs
//! - Execution: Dispatching workers concurrently under the plan's dependencies
//! - Context: Per-conversation shared state with generation-checked writes
//! - Risk: Scoring remediation candidates and routing them by tier
//! - Rollback: Snapshot-backed mutating batches and run-level reverts
//! - Audit: Append-only record of every dispatch and completion

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod approval;
pub mod audit;
pub mod capability;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod intent;
pub mod optimizer;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod response;
pub mod retry;
pub mod risk;
pub mod rollback;
pub mod worker;

pub use approval::{
    spawn_approval_sweeper, ApprovalError, ApprovalGate, ApprovalQueue, ApprovalQueueConfig,
    ConfirmationRequest, ConfirmationStatus,
};
pub use audit::{AuditError, AuditEvent, AuditEventKind, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use capability::{Capability, CapabilityCatalog, CapabilityProfile};
pub use context::{
    keys, spawn_expiry_sweeper, ContextError, ContextHandle, ContextKey, ContextStoreConfig,
    Generation, SharedContextStore,
};
pub use error::{format_error_for_chat, format_error_for_cli, Error, Result, UserFriendlyError};
pub use event_bus::{EventBus, OrchestratorEvent, RunSubscription};
pub use intent::{Intent, IntentClassifier};
pub use optimizer::{ContentBundle, ContextOptimizer, PriorityTrimmer};
pub use orchestrator::{
    ConversationContext, ExecutionRun, Orchestrator, OrchestratorConfig, RollbackSummary,
    RunState, StepRecord, StepState,
};
pub use plan::{FailurePolicy, Plan, PlanBuilder, PlanKind, Step, StepAction, StepId};
pub use planner::{Planner, PlanningError};
pub use response::{RemediationCounts, RunResponse, StepSummary};
pub use retry::RetryPolicy;
pub use risk::{
    classify, ClassifiedCandidate, RemediationCandidate, RemediationReport, RiskAssessment,
    RiskTier, RoutingDecision, RoutingPolicy,
};
pub use rollback::{
    BatchExecutor, BatchResult, BatchStatus, MutatingAction, Mutator, RollbackError,
    RollbackPolicy, SnapshotEntry,
};
pub use worker::{FailureDetail, FailureKind, StepResult, Task, Worker, WorkerRegistry};
