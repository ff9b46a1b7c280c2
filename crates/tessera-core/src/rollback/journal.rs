use std::sync::Arc;

use super::types::{RollbackError, RollbackSnapshot};
use crate::context::{ContextKey, SharedContextStore};

const JOURNAL_WRITER: &str = "rollback-journal";

/// Durable home of a batch's snapshot stack
pub trait SnapshotJournal: Send + Sync {
    /// Persist the current snapshot stack
    fn persist(&self, snapshot: &RollbackSnapshot) -> Result<(), RollbackError>;

    /// Drop the persisted stack
    fn discard(&self);
}

/// Journal that keeps the snapshot stack in the shared context store
#[derive(Debug, Clone)]
pub struct ContextSnapshotJournal {
    store: Arc<SharedContextStore>,
    key: ContextKey,
}

impl ContextSnapshotJournal {
    /// Create a journal writing to `key`
    #[must_use]
    pub fn new(store: Arc<SharedContextStore>, key: ContextKey) -> Self {
        Self { store, key }
    }

    /// Key the snapshot stack is written to
    #[must_use]
    pub fn key(&self) -> &ContextKey {
        &self.key
    }
}

impl SnapshotJournal for ContextSnapshotJournal {
    fn persist(&self, snapshot: &RollbackSnapshot) -> Result<(), RollbackError> {
        let value =
            serde_json::to_value(snapshot).map_err(|e| RollbackError::Journal(e.to_string()))?;
        self.store.put(&self.key, value, Some(JOURNAL_WRITER));
        Ok(())
    }

    fn discard(&self) {
        self.store.remove(&self.key);
    }
}
