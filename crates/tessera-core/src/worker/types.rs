use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::capability::Capability;
use crate::optimizer::ContentBundle;
use crate::plan::StepId;

/// Why a step (or one item of a step) failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The step exceeded its timeout
    Timeout,
    /// The external system was unreachable or throttled
    Unavailable,
    /// The request was refused (validation, policy, permissions)
    Rejected,
    /// Bug or unexpected state inside the worker
    InternalError,
    /// Prompt content did not fit the token budget
    ContextTooLarge,
}

impl FailureKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::Rejected => "rejected",
            Self::InternalError => "internal_error",
            Self::ContextTooLarge => "context_too_large",
        }
    }

    /// Whether a retry may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed item inside a partially successful step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Item reference (operation ID, resource ID, candidate ID)
    pub item: String,
    /// Failure classification
    pub kind: FailureKind,
    /// Detailed message
    pub message: String,
}

impl FailureDetail {
    /// Create a failure detail
    #[must_use]
    pub fn new(item: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of exactly one worker invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    /// Everything succeeded
    Success {
        /// Worker output
        payload: serde_json::Value,
    },
    /// Some items succeeded, some failed
    PartialSuccess {
        /// Items that succeeded
        succeeded: Vec<String>,
        /// Items that failed
        failed: Vec<String>,
        /// Why each failed item failed
        failure_details: Vec<FailureDetail>,
    },
    /// The step failed as a whole
    Failure {
        /// Failure classification
        kind: FailureKind,
        /// Detailed message
        message: String,
    },
}

impl StepResult {
    /// Create a success result
    #[must_use]
    pub fn success(payload: serde_json::Value) -> Self {
        Self::Success { payload }
    }

    /// Create a failure result
    #[must_use]
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Create a partial result from failure details
    #[must_use]
    pub fn partial(succeeded: Vec<String>, failure_details: Vec<FailureDetail>) -> Self {
        Self::PartialSuccess {
            succeeded,
            failed: failure_details.iter().map(|d| d.item.clone()).collect(),
            failure_details,
        }
    }

    /// Status tag (`success`, `partial_success`, `failure`)
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::PartialSuccess { .. } => "partial_success",
            Self::Failure { .. } => "failure",
        }
    }

    /// Whether the step fully succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether dependents of this step may run
    #[must_use]
    pub fn satisfies_dependents(&self) -> bool {
        !matches!(self, Self::Failure { .. })
    }

    /// Failure kind, for `Failure` results
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Input handed to a worker for one step
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Execution run this task belongs to
    pub run_id: Uuid,
    /// Step being executed
    pub step_id: StepId,
    /// Capability requested
    pub capability: Capability,
    /// Conversation scope
    pub conversation_id: String,
    /// Step input payload (empty object when degraded)
    pub input: serde_json::Value,
    /// Running with degraded input because a dependency failed
    pub degraded: bool,
    /// Dependencies that failed, when degraded
    pub missing_dependencies: Vec<StepId>,
    /// Stable ID for deduplicating non-idempotent calls across retries
    pub operation_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Optimized prompt content for LLM-backed workers
    pub bundles: Vec<ContentBundle>,
}

impl Task {
    /// Create a task for a step
    #[must_use]
    pub fn new(
        run_id: Uuid,
        step_id: StepId,
        capability: Capability,
        conversation_id: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        let operation_id = format!("{}:{}", run_id, step_id);
        Self {
            run_id,
            step_id,
            capability,
            conversation_id: conversation_id.into(),
            input,
            degraded: false,
            missing_dependencies: Vec::new(),
            operation_id,
            attempt: 1,
            bundles: Vec::new(),
        }
    }

    /// Mark as degraded because the given dependencies failed
    #[must_use]
    pub fn degraded(mut self, missing: Vec<StepId>) -> Self {
        self.degraded = true;
        self.missing_dependencies = missing;
        self.input = serde_json::Value::Object(serde_json::Map::new());
        self
    }

    /// Attach optimized prompt content
    #[must_use]
    pub fn with_bundles(mut self, bundles: Vec<ContentBundle>) -> Self {
        self.bundles = bundles;
        self
    }
}
