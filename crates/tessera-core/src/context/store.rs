use chrono::Utc;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::handle::ContextHandle;
use super::types::{ContextEntry, ContextError, ContextKey, ContextStoreConfig, Generation};
use crate::plan::StepId;

/// State of one conversation
#[derive(Debug)]
struct Conversation {
    entries: HashMap<String, ContextEntry>,
    /// Monotonic write counter; every write takes the next value
    clock: u64,
    last_touched: Instant,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            clock: 0,
            last_touched: Instant::now(),
        }
    }
}

impl Conversation {
    fn generation_of(&self, name: &str) -> Generation {
        self.entries
            .get(name)
            .map(|e| e.generation)
            .unwrap_or(Generation::ABSENT)
    }

    fn write(&mut self, name: &str, value: serde_json::Value, writer: Option<&str>) -> Generation {
        self.clock += 1;
        let generation = Generation(self.clock);
        self.entries.insert(
            name.to_string(),
            ContextEntry {
                value,
                generation,
                writer: writer.map(str::to_string),
                written_at: Utc::now(),
            },
        );
        self.last_touched = Instant::now();
        generation
    }
}

/// Per-conversation keyed store shared by the orchestrator and its workers.
///
/// Each conversation is guarded by its own shard lock, so compare-and-set on a
/// key is atomic with respect to every other writer of that conversation.
#[derive(Debug, Default)]
pub struct SharedContextStore {
    conversations: DashMap<String, Conversation>,
}

impl SharedContextStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation state with its idle clock reset; reads count as activity
    fn touch(&self, conversation_id: &str) -> Option<RefMut<'_, String, Conversation>> {
        let mut conversation = self.conversations.get_mut(conversation_id)?;
        conversation.last_touched = Instant::now();
        Some(conversation)
    }

    /// Read the latest entry for a key
    #[must_use]
    pub fn get(&self, key: &ContextKey) -> Option<ContextEntry> {
        let conversation = self.touch(&key.conversation_id)?;
        conversation.entries.get(&key.name).cloned()
    }

    /// Current generation of a key (`Generation::ABSENT` if missing)
    #[must_use]
    pub fn generation(&self, key: &ContextKey) -> Generation {
        self.touch(&key.conversation_id)
            .map(|c| c.generation_of(&key.name))
            .unwrap_or(Generation::ABSENT)
    }

    /// Whether a key currently holds a value
    #[must_use]
    pub fn contains(&self, key: &ContextKey) -> bool {
        !self.generation(key).is_absent()
    }

    /// Write `value` only if the key is still at generation `expected`.
    ///
    /// Returns the new generation, or `GenerationMismatch` if another writer
    /// got there first. The caller decides whether to re-read and retry.
    pub fn compare_and_set(
        &self,
        key: &ContextKey,
        expected: Generation,
        value: serde_json::Value,
        writer: Option<&str>,
    ) -> Result<Generation, ContextError> {
        let mut conversation = self
            .conversations
            .entry(key.conversation_id.clone())
            .or_default();

        let actual = conversation.generation_of(&key.name);
        if actual != expected {
            debug!(key = %key, %expected, %actual, "Rejected stale context write");
            return Err(ContextError::GenerationMismatch {
                key: key.name.clone(),
                expected,
                actual,
            });
        }

        let generation = conversation.write(&key.name, value, writer);
        debug!(key = %key, %generation, writer = ?writer, "Context write");
        Ok(generation)
    }

    /// Unconditional last-writer-wins write
    pub fn put(
        &self,
        key: &ContextKey,
        value: serde_json::Value,
        writer: Option<&str>,
    ) -> Generation {
        let mut conversation = self
            .conversations
            .entry(key.conversation_id.clone())
            .or_default();
        conversation.write(&key.name, value, writer)
    }

    /// Read-modify-write with compare-and-set, retried on conflicts.
    ///
    /// `f` receives the current value (if any) and returns the value to store.
    pub fn update<F>(
        &self,
        key: &ContextKey,
        writer: Option<&str>,
        max_attempts: u32,
        mut f: F,
    ) -> Result<Generation, ContextError>
    where
        F: FnMut(Option<&serde_json::Value>) -> serde_json::Value,
    {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            let current = self.get(key);
            let expected = current
                .as_ref()
                .map(|e| e.generation)
                .unwrap_or(Generation::ABSENT);
            let next = f(current.as_ref().map(|e| &e.value));

            match self.compare_and_set(key, expected, next, writer) {
                Ok(generation) => return Ok(generation),
                Err(ContextError::GenerationMismatch { .. }) if attempt < attempts => continue,
                Err(ContextError::GenerationMismatch { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        Err(ContextError::RetriesExhausted {
            key: key.name.clone(),
            attempts,
        })
    }

    /// Remove a key, returning its last entry
    pub fn remove(&self, key: &ContextKey) -> Option<ContextEntry> {
        let mut conversation = self.conversations.get_mut(&key.conversation_id)?;
        conversation.last_touched = Instant::now();
        conversation.entries.remove(&key.name)
    }

    /// Key names present in a conversation, sorted
    #[must_use]
    pub fn keys(&self, conversation_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .conversations
            .get(conversation_id)
            .map(|c| c.entries.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Copy of every value in a conversation
    #[must_use]
    pub fn snapshot(&self, conversation_id: &str) -> BTreeMap<String, serde_json::Value> {
        self.conversations
            .get(conversation_id)
            .map(|c| {
                c.entries
                    .iter()
                    .map(|(k, e)| (k.clone(), e.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tear down a conversation's context. Returns the number of entries dropped.
    pub fn end_conversation(&self, conversation_id: &str) -> usize {
        let removed = self
            .conversations
            .remove(conversation_id)
            .map(|(_, c)| c.entries.len())
            .unwrap_or(0);
        if removed > 0 {
            info!(conversation_id, entries = removed, "Conversation context torn down");
        }
        removed
    }

    /// Drop every conversation idle for at least `ttl`. Returns their IDs.
    pub fn expire_idle(&self, ttl: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        self.conversations.retain(|id, conversation| {
            if conversation.last_touched.elapsed() >= ttl {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });
        expired.sort();
        expired
    }

    /// Number of live conversations
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Create a worker-facing handle for one step.
    ///
    /// Generations of the step's writable keys are observed now, so a later
    /// write by the step fails if someone else wrote the key in between.
    #[must_use]
    pub fn handle(
        self: &Arc<Self>,
        conversation_id: impl Into<String>,
        step_id: StepId,
        writable: BTreeSet<String>,
    ) -> ContextHandle {
        let conversation_id = conversation_id.into();
        let observed = writable
            .iter()
            .map(|name| {
                let key = ContextKey::new(conversation_id.clone(), name.clone());
                (name.clone(), self.generation(&key))
            })
            .collect();
        ContextHandle::new(Arc::clone(self), conversation_id, step_id, writable, observed)
    }
}

/// Spawn a background task that tears down idle conversations until cancelled.
pub fn spawn_expiry_sweeper(
    store: Arc<SharedContextStore>,
    config: ContextStoreConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let ttl = Duration::from_secs(config.session_ttl_secs);
    let interval = Duration::from_secs(config.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Context expiry sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = store.expire_idle(ttl);
                    if !expired.is_empty() {
                        info!(count = expired.len(), "Expired idle conversation contexts");
                    }
                }
            }
        }
    })
}
