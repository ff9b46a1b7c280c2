//! Error types for tessera-core
//!
//! This module provides the crate-wide error type and user-facing error
//! formatting. Step-level failures are normally contained inside an
//! [`ExecutionRun`](crate::orchestrator::ExecutionRun); the variants here are
//! the ones that escape to the caller.

use thiserror::Error;

use crate::approval::ApprovalError;
use crate::audit::AuditError;
use crate::context::ContextError;
use crate::planner::PlanningError;
use crate::risk::RiskError;
use crate::rollback::RollbackError;
use crate::worker::FailureKind;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be turned into a valid plan (fatal, never retried)
    #[error("planning error: {0}")]
    Planning(#[from] PlanningError),

    /// A worker step failed
    #[error("step failure ({kind}): {message}")]
    StepFailure {
        /// Failure classification
        kind: FailureKind,
        /// Detailed message
        message: String,
    },

    /// A rollback could not restore every captured snapshot
    #[error("rollback incomplete: {} resource(s) need manual remediation", unreverted.len())]
    RollbackIncomplete {
        /// Resources whose prior state could not be restored
        unreverted: Vec<String>,
    },

    /// Prompt content did not fit the token budget after optimization
    #[error("context too large: {required} tokens required, budget is {budget}")]
    ContextTooLarge {
        /// Tokens required by mandatory content
        required: usize,
        /// Configured token budget
        budget: usize,
    },

    /// Shared context store error
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// Audit sink error
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// Approval hand-off error
    #[error("approval error: {0}")]
    Approval(#[from] ApprovalError),

    /// Malformed remediation candidate
    #[error("risk error: {0}")]
    Risk(#[from] RiskError),

    /// Snapshot capture, apply or restore error
    #[error("rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error (serialization, invariant violations)
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {e}"))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is fatal for the request and must not be retried
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::StepFailure { kind, .. } => !kind.is_transient(),
            _ => true,
        }
    }
}

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Planning(e) => {
                format!("❓ Your request was ambiguous: {}", e)
            }
            Error::StepFailure { kind, message } => {
                format!("⚡ A worker step failed ({}): {}", kind, message)
            }
            Error::RollbackIncomplete { unreverted } => format!(
                "🛑 Rollback incomplete. {} resource(s) could not be restored: {}",
                unreverted.len(),
                unreverted.join(", ")
            ),
            Error::ContextTooLarge { required, budget } => format!(
                "📚 The request needs {} tokens of context but only {} are available.",
                required, budget
            ),
            Error::Context(e) => format!("🧠 Shared context error: {}", e),
            Error::Audit(e) => format!("📼 Audit trail error: {}", e),
            Error::Approval(e) => format!("✋ Approval error: {}", e),
            Error::Risk(e) => format!("⚖️ Remediation candidate rejected: {}", e),
            Error::Rollback(e) => format!("↩️ Rollback error: {}", e),
            Error::Configuration(msg) => format!("⚙️ Configuration error: {}", msg),
            Error::Internal(msg) => format!("❌ Internal error: {}", msg),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::Planning(_) => Some(
                "💡 Rephrase the request and name the task explicitly (e.g. scan, estimate cost, remediate)."
                    .to_string(),
            ),
            Error::StepFailure { kind, .. } if kind.is_transient() => {
                Some("💡 The service may be busy. Try again in a moment.".to_string())
            }
            Error::RollbackIncomplete { .. } => Some(
                "💡 Manual intervention required: restore the listed resources from the recorded snapshots."
                    .to_string(),
            ),
            Error::ContextTooLarge { .. } => Some(
                "💡 Simplify the request or narrow its scope (fewer resources, one subscription)."
                    .to_string(),
            ),
            Error::Configuration(_) => {
                Some("💡 Check config/default.toml or TESSERA_* environment variables.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = String::new();

    output.push_str(&error.user_message());
    output.push_str("\n\n");

    if let Some(suggestion) = error.suggestion() {
        output.push_str(&suggestion);
        output.push('\n');
    }

    output
}

/// Format an error for display in a chat message
pub fn format_error_for_chat(error: &Error) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }

    output
}

#[cfg(test)]
mod tests;
