//! Orchestrator helper methods
//!
//! Contains utility methods for the Orchestrator:
//! - Event emission
//! - Audit appends
//! - Snapshot journal construction

use std::sync::Arc;
use tracing::warn;

use super::config::ConversationContext;
use super::core::Orchestrator;
use crate::audit::AuditEvent;
use crate::context::{keys, ContextKey};
use crate::event_bus::OrchestratorEvent;
use crate::plan::Step;
use crate::rollback::ContextSnapshotJournal;

impl Orchestrator {
    /// Publish an event to the event bus (no-op if no bus is set).
    pub(crate) fn emit(&self, event: OrchestratorEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Append an event to the audit sink (no-op if no sink is set).
    ///
    /// A failed append is logged; the run keeps going.
    pub(crate) async fn audit(&self, event: AuditEvent) {
        if let Some(sink) = &self.audit {
            let kind = event.kind;
            if let Err(e) = sink.append(event).await {
                warn!(error = %e, ?kind, "Failed to append audit event");
            }
        }
    }

    /// Shared-context key holding the snapshot stack of a mutating step
    pub(crate) fn snapshot_key(&self, conversation: &ConversationContext, step: &Step) -> ContextKey {
        ContextKey::new(
            conversation.conversation_id.clone(),
            keys::snapshot_for(step.id.as_str()),
        )
    }

    /// Journal persisting a mutating step's snapshot stack
    pub(crate) fn snapshot_journal(
        &self,
        conversation: &ConversationContext,
        step: &Step,
    ) -> ContextSnapshotJournal {
        ContextSnapshotJournal::new(
            Arc::clone(&self.store),
            self.snapshot_key(conversation, step),
        )
    }
}
