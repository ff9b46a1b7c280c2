//! Orchestrator configuration
//!
//! Contains configuration types for the orchestrator:
//! - `OrchestratorConfig` for scheduling, timeouts, retries and routing
//! - `ConversationContext` for the conversation a run executes in

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::capability::Capability;
use crate::retry::RetryPolicy;
use crate::risk::RoutingPolicy;

/// Conversation a request belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Conversation ID; scopes the shared context store
    pub conversation_id: String,
    /// User who sent the request
    #[serde(default)]
    pub user_id: Option<String>,
    /// Free-form state handed to the intent classifier
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ConversationContext {
    /// Create a context for a conversation
    #[must_use]
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Set the user ID
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum steps running at once across the run (0 = unbounded)
    #[serde(default)]
    pub max_concurrency: usize,
    /// Maximum steps running at once per capability
    #[serde(default)]
    pub capability_concurrency: BTreeMap<Capability, usize>,
    /// Step timeout when no capability-specific one is set, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Capability-specific step timeouts, in milliseconds
    #[serde(default)]
    pub step_timeouts_ms: BTreeMap<Capability, u64>,
    /// Retry policy for transient step failures
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Token budget for LLM-backed steps
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Capabilities whose workers call an LLM
    #[serde(default = "default_llm_backed")]
    pub llm_backed: BTreeSet<Capability>,
    /// Remediation routing policy
    #[serde(default)]
    pub routing: RoutingPolicy,
    /// Confirmation request lifetime, in seconds
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: i64,
    /// Event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_token_budget() -> usize {
    8_000
}

fn default_llm_backed() -> BTreeSet<Capability> {
    [Capability::Knowledge].into_iter().collect()
}

fn default_confirmation_timeout_secs() -> i64 {
    3_600
}

fn default_event_capacity() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            capability_concurrency: BTreeMap::new(),
            default_timeout_ms: default_timeout_ms(),
            step_timeouts_ms: BTreeMap::new(),
            retry: RetryPolicy::default(),
            token_budget: default_token_budget(),
            llm_backed: default_llm_backed(),
            routing: RoutingPolicy::default(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global concurrency limit (0 = unbounded)
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Cap concurrent steps of one capability
    #[must_use]
    pub fn with_capability_concurrency(mut self, capability: Capability, max: usize) -> Self {
        self.capability_concurrency.insert(capability, max);
        self
    }

    /// Set the default step timeout
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the timeout of one capability
    #[must_use]
    pub fn with_step_timeout(mut self, capability: Capability, timeout: Duration) -> Self {
        self.step_timeouts_ms
            .insert(capability, timeout.as_millis() as u64);
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the token budget for LLM-backed steps
    #[must_use]
    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    /// Set the routing policy
    #[must_use]
    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    /// Timeout for a step of `capability`
    #[must_use]
    pub fn timeout_for(&self, capability: Capability) -> Duration {
        let ms = self
            .step_timeouts_ms
            .get(&capability)
            .copied()
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Whether steps of `capability` go through prompt optimization
    #[must_use]
    pub fn is_llm_backed(&self, capability: Capability) -> bool {
        self.llm_backed.contains(&capability)
    }
}
