//! Prompt context optimization for LLM-backed workers
//!
//! Before an LLM-backed worker is called, the orchestrator packs the step
//! input and the shared-context values it reads into [`ContentBundle`]s and
//! runs them through a [`ContextOptimizer`]. Content that still does not fit
//! is a fatal `ContextTooLarge`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Smallest remainder worth keeping when truncating an optional bundle
const MIN_TRUNCATED_TOKENS: usize = 32;

/// Rough token estimate (4 bytes per token)
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// A named piece of prompt content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBundle {
    /// Bundle name (step input, context key)
    pub name: String,
    /// Content
    pub content: String,
    /// Higher survives trimming first
    #[serde(default)]
    pub priority: u8,
    /// Must be kept whole
    #[serde(default)]
    pub required: bool,
}

impl ContentBundle {
    /// Create an optional bundle
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            priority,
            required: false,
        }
    }

    /// Create a required bundle
    #[must_use]
    pub fn required(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            priority: u8::MAX,
            required: true,
        }
    }

    /// Estimated token count
    #[must_use]
    pub fn tokens(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

/// Collaborator that fits prompt content into a token budget
pub trait ContextOptimizer: Send + Sync {
    /// Return bundles whose total fits `token_budget`, or `ContextTooLarge`
    fn optimize(&self, bundles: Vec<ContentBundle>, token_budget: usize)
        -> Result<Vec<ContentBundle>>;
}

/// Keeps required bundles, then optional ones by descending priority,
/// truncating the last one that partially fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityTrimmer;

impl ContextOptimizer for PriorityTrimmer {
    fn optimize(
        &self,
        bundles: Vec<ContentBundle>,
        token_budget: usize,
    ) -> Result<Vec<ContentBundle>> {
        let required: usize = bundles.iter().filter(|b| b.required).map(|b| b.tokens()).sum();
        if required > token_budget {
            return Err(Error::ContextTooLarge {
                required,
                budget: token_budget,
            });
        }

        let mut remaining = token_budget - required;
        let mut optional: Vec<(usize, &ContentBundle)> = bundles
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.required)
            .collect();
        optional.sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then(a.0.cmp(&b.0)));

        let mut kept = vec![None; bundles.len()];
        for (index, bundle) in optional {
            let tokens = bundle.tokens();
            if tokens <= remaining {
                remaining -= tokens;
                kept[index] = Some(bundle.content.clone());
            } else if remaining >= MIN_TRUNCATED_TOKENS {
                kept[index] = Some(truncate_utf8(&bundle.content, remaining * 4).to_string());
                remaining = 0;
            } else {
                debug!(bundle = %bundle.name, tokens, "Dropped bundle over budget");
            }
        }

        Ok(bundles
            .into_iter()
            .zip(kept)
            .filter_map(|(bundle, content)| {
                if bundle.required {
                    Some(bundle)
                } else {
                    content.map(|content| ContentBundle { content, ..bundle })
                }
            })
            .collect())
    }
}

fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
