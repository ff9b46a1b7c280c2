use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::capability::Capability;
use crate::plan::StepId;

/// Kind of audited occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Run started
    RunStarted,
    /// Step handed to a worker
    StepDispatched,
    /// Step produced a result
    StepCompleted,
    /// Step skipped or cancelled
    StepSkipped,
    /// Candidate handed to a human
    ConfirmationRequested,
    /// Run-level rollback started
    RollbackStarted,
    /// Run-level rollback finished
    RollbackCompleted,
    /// Run reached a terminal state
    RunFinished,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Run identifier
    pub run_id: Uuid,
    /// What happened
    pub kind: AuditEventKind,
    /// Step, for step-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// Capability, for step-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    /// SHA-256 hex of the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Short status (`success`, `failure:timeout`, run state)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AuditEvent {
    /// Create a run-level event
    #[must_use]
    pub fn new(run_id: Uuid, kind: AuditEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            kind,
            step_id: None,
            capability: None,
            content_hash: None,
            status: None,
        }
    }

    /// Attach the step
    #[must_use]
    pub fn with_step(mut self, step_id: StepId, capability: Capability) -> Self {
        self.step_id = Some(step_id);
        self.capability = Some(capability);
        self
    }

    /// Attach the hash of a payload
    #[must_use]
    pub fn with_payload(mut self, payload: &serde_json::Value) -> Self {
        self.content_hash = Some(content_hash(payload));
        self
    }

    /// Attach a short status
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// SHA-256 hex digest of a JSON payload
#[must_use]
pub fn content_hash(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Audit sink errors
#[derive(Debug, Error)]
pub enum AuditError {
    /// I/O error
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink refused the event
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}
