//! Approval - hand-off of `RequireConfirmation` candidates to humans
//!
//! The orchestrator never waits for a decision. It submits a
//! [`ConfirmationRequest`] through an [`ApprovalGate`] and reports the
//! candidate as awaiting confirmation. [`ApprovalQueue`] is the in-memory
//! gate; unanswered requests expire into `Rejected`, and settled requests
//! are purged after the retention window by [`spawn_approval_sweeper`].

mod queue;
mod types;

pub use queue::{spawn_approval_sweeper, ApprovalQueue};
pub use types::{ApprovalError, ApprovalQueueConfig, ConfirmationRequest, ConfirmationStatus};

/// Collaborator that receives confirmation requests
#[async_trait::async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Hand a request to the approval subsystem
    async fn submit(&self, request: ConfirmationRequest) -> Result<(), ApprovalError>;
}

#[cfg(test)]
mod tests;
