use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::plan::StepId;
use crate::risk::{ClassifiedCandidate, RemediationCandidate, RiskAssessment};

/// Status of a confirmation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    /// Waiting for a decision
    Pending,
    /// A human approved the fix
    Approved,
    /// A human rejected the fix, or nobody answered in time
    Rejected,
}

/// A remediation candidate waiting for human confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    /// Unique request ID
    pub id: Uuid,
    /// Execution run that produced the request
    pub run_id: Uuid,
    /// Remediation step that routed the candidate
    pub step_id: StepId,
    /// Conversation scope
    pub conversation_id: String,
    /// Candidate awaiting confirmation
    pub candidate: RemediationCandidate,
    /// Why it needs confirmation
    pub assessment: RiskAssessment,
    /// Current status
    pub status: ConfirmationStatus,
    /// Who responded (for audit)
    pub responder_id: Option<String>,
    /// When the request was created
    pub created_at: DateTime<Utc>,
    /// When the request expires
    pub expires_at: DateTime<Utc>,
    /// When someone responded
    pub responded_at: Option<DateTime<Utc>>,
}

impl ConfirmationRequest {
    /// Create a pending request
    #[must_use]
    pub fn new(
        run_id: Uuid,
        step_id: StepId,
        conversation_id: impl Into<String>,
        classified: &ClassifiedCandidate,
        timeout_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            run_id,
            step_id,
            conversation_id: conversation_id.into(),
            candidate: classified.candidate().clone(),
            assessment: *classified.assessment(),
            status: ConfirmationStatus::Pending,
            responder_id: None,
            created_at: now,
            expires_at: now + Duration::seconds(timeout_secs),
            responded_at: None,
        }
    }

    /// Check if the request has expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if the request is still pending
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ConfirmationStatus::Pending && !self.is_expired()
    }

    /// Record a decision. Returns false if the request is no longer pending.
    pub fn resolve(&mut self, decision: ConfirmationStatus, responder_id: &str) -> bool {
        if !self.is_pending() || decision == ConfirmationStatus::Pending {
            return false;
        }
        self.status = decision;
        self.responder_id = Some(responder_id.to_string());
        self.responded_at = Some(Utc::now());
        true
    }

    /// When the request stopped being pending, if it has
    #[must_use]
    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            ConfirmationStatus::Pending if self.is_expired() => Some(self.expires_at),
            ConfirmationStatus::Pending => None,
            _ => self.responded_at.or(Some(self.expires_at)),
        }
    }

    /// Expired requests are rejected
    pub fn expire(&mut self) {
        if self.status == ConfirmationStatus::Pending {
            self.status = ConfirmationStatus::Rejected;
            self.responded_at = Some(Utc::now());
        }
    }
}

/// Approval queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalQueueConfig {
    /// How long resolved and expired requests stay queryable
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// How often the sweeper expires and purges requests
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_retention() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for ApprovalQueueConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Error from the approval subsystem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// Request not found
    #[error("confirmation request not found")]
    NotFound,
    /// Request already resolved or expired
    #[error("confirmation request is no longer pending")]
    NotPending,
    /// The approval subsystem could not take the request
    #[error("approval subsystem unavailable: {0}")]
    Unavailable(String),
}
