//! Intent - structured output of the (external) intent classifier
//!
//! Natural-language understanding is not done here. An [`IntentClassifier`]
//! collaborator turns user text into an [`Intent`]; the
//! [`Planner`](crate::planner::Planner) turns the intent into a plan.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::orchestrator::ConversationContext;

/// Classified user request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Capability names suggested by the classifier, in the order mentioned
    #[serde(default)]
    pub capability_hints: Vec<String>,
    /// Extracted parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Intent {
    /// Create an empty intent
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability hint
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.capability_hints.push(hint.into());
        self
    }

    /// Set a parameter
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Look up a parameter
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Boolean parameter, `false` when missing or not a bool
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.parameters
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Collaborator that classifies user text into an [`Intent`]
#[async_trait::async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify one user message in the context of its conversation
    async fn classify(
        &self,
        user_text: &str,
        conversation: &ConversationContext,
    ) -> crate::Result<Intent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_builder() {
        let intent = Intent::new()
            .with_hint("discovery")
            .with_hint("compliance")
            .with_parameter("remediate", json!(true));

        assert_eq!(intent.capability_hints, vec!["discovery", "compliance"]);
        assert!(intent.flag("remediate"));
        assert!(!intent.flag("missing"));
    }

    #[test]
    fn test_intent_deserializes_with_defaults() {
        let intent: Intent = serde_json::from_value(json!({
            "capability_hints": ["cost"]
        }))
        .unwrap();
        assert_eq!(intent.capability_hints, vec!["cost"]);
        assert!(intent.parameters.is_empty());
    }
}
