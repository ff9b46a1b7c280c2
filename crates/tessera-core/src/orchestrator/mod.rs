//! Orchestrator - plan execution across capability workers
//!
//! This module ties together the planner, the worker registry, the shared
//! context store, risk routing and rollback.
//!
//! # Module Structure
//!
//! - `types`: Run and step state machines (ExecutionRun, StepRecord, etc.)
//! - `config`: Configuration types (OrchestratorConfig, ConversationContext)
//! - `core`: Orchestrator struct, builder methods and entry points
//! - `execute`: Scheduler loop, cancellation and run-level rollback
//! - `dispatch`: Per-step dispatch (timeouts, retries, mutating batches)
//! - `remediation`: Risk-routed remediation steps
//! - `helpers`: Utility methods (emit, audit)

mod config;
mod core;
mod dispatch;
mod execute;
mod helpers;
mod remediation;
mod types;


// Re-export public types
pub use config::{ConversationContext, OrchestratorConfig};
pub use core::Orchestrator;
pub use types::{ExecutionRun, RollbackSummary, RunState, StepRecord, StepState};
