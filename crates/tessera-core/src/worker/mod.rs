//! Worker - the single contract every capability implements
//!
//! Workers hold no reference to one another. The orchestrator owns them
//! through a [`WorkerRegistry`] and hands each invocation a [`Task`] plus a
//! [`ContextHandle`](crate::context::ContextHandle) scoped to that step.

mod registry;
mod types;

pub use registry::WorkerRegistry;
pub use types::{FailureDetail, FailureKind, StepResult, Task};

use crate::capability::Capability;
use crate::context::ContextHandle;
use crate::rollback::Mutator;

/// Trait for capability workers
///
/// `process` must be safe to retry after `Timeout` or `Unavailable`.
/// Non-idempotent mutations dedupe on [`Task::operation_id`].
#[async_trait::async_trait]
pub trait Worker: Send + Sync {
    /// Capability served by this worker
    fn capability(&self) -> Capability;

    /// Handle one step
    async fn process(&self, task: &Task, context: &ContextHandle) -> StepResult;

    /// Snapshot-capable mutation interface, if the worker mutates resources
    fn mutator(&self) -> Option<&dyn Mutator> {
        None
    }
}
