use tokio::sync::RwLock;

use super::types::{AuditError, AuditEvent};
use super::AuditSink;

/// Audit sink that keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
    flushed: RwLock<usize>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event appended so far
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Number of events covered by the last flush
    pub async fn flushed(&self) -> usize {
        *self.flushed.read().await
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditError> {
        let len = self.events.read().await.len();
        *self.flushed.write().await = len;
        Ok(())
    }
}
