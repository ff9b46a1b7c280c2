//! Audit - append-only record of every dispatch and completion
//!
//! Events carry a SHA-256 of the payload instead of the payload itself. The
//! orchestrator does not stop on a failed append, but it flushes the sink
//! before reporting a run `Completed`.

mod jsonl;
mod memory;
mod types;

pub use jsonl::JsonlAuditSink;
pub use memory::MemoryAuditSink;
pub use types::{content_hash, AuditError, AuditEvent, AuditEventKind};

/// Append-only audit collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Make every appended event durable
    async fn flush(&self) -> Result<(), AuditError>;
}

#[cfg(test)]
mod tests;
