use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::store::SharedContextStore;
use super::types::{ContextError, ContextKey, Generation};
use crate::plan::StepId;

/// Conflicting writes are retried this many times by [`ContextHandle::update`]
const DEFAULT_UPDATE_ATTEMPTS: u32 = 3;

/// Worker view of the shared context store.
///
/// Scoped to one conversation and one step: any key of the conversation can
/// be read, only the step's declared keys can be written, and every write is
/// a compare-and-set against the generation this handle last observed.
#[derive(Debug)]
pub struct ContextHandle {
    store: Arc<SharedContextStore>,
    conversation_id: String,
    step_id: StepId,
    writable: BTreeSet<String>,
    observed: DashMap<String, Generation>,
}

impl ContextHandle {
    pub(super) fn new(
        store: Arc<SharedContextStore>,
        conversation_id: String,
        step_id: StepId,
        writable: BTreeSet<String>,
        observed: DashMap<String, Generation>,
    ) -> Self {
        Self {
            store,
            conversation_id,
            step_id,
            writable,
            observed,
        }
    }

    /// Conversation this handle is scoped to
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Step this handle was issued to
    #[must_use]
    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    fn key(&self, name: &str) -> ContextKey {
        ContextKey::new(self.conversation_id.clone(), name)
    }

    /// Read a value. Absence is `None`, never an error.
    pub fn read(&self, name: &str) -> Option<serde_json::Value> {
        let key = self.key(name);
        match self.store.get(&key) {
            Some(entry) => {
                self.observed.insert(name.to_string(), entry.generation);
                Some(entry.value)
            }
            None => {
                self.observed.insert(name.to_string(), Generation::ABSENT);
                None
            }
        }
    }

    /// Read and decode a value
    pub fn read_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ContextError> {
        self.read(name)
            .map(|value| {
                serde_json::from_value(value).map_err(|e| ContextError::Decode {
                    key: name.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Whether a key currently holds a value
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(&self.key(name))
    }

    /// Write a value into the generation last observed by this handle.
    pub fn write(&self, name: &str, value: serde_json::Value) -> Result<Generation, ContextError> {
        if !self.writable.contains(name) {
            return Err(ContextError::UndeclaredWrite {
                step_id: self.step_id.to_string(),
                key: name.to_string(),
            });
        }

        let expected = self
            .observed
            .get(name)
            .map(|g| *g)
            .unwrap_or(Generation::ABSENT);
        let generation = self.store.compare_and_set(
            &self.key(name),
            expected,
            value,
            Some(self.step_id.as_str()),
        )?;
        self.observed.insert(name.to_string(), generation);
        Ok(generation)
    }

    /// Serialize and write a value
    pub fn write_as<T: Serialize>(&self, name: &str, value: &T) -> Result<Generation, ContextError> {
        let value = serde_json::to_value(value).map_err(|e| ContextError::Decode {
            key: name.to_string(),
            message: e.to_string(),
        })?;
        self.write(name, value)
    }

    /// Re-read, recompute and write until the compare-and-set succeeds.
    pub fn update<F>(&self, name: &str, mut f: F) -> Result<Generation, ContextError>
    where
        F: FnMut(Option<&serde_json::Value>) -> serde_json::Value,
    {
        for _ in 0..DEFAULT_UPDATE_ATTEMPTS {
            let current = self.read(name);
            match self.write(name, f(current.as_ref())) {
                Ok(generation) => return Ok(generation),
                Err(ContextError::GenerationMismatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ContextError::RetriesExhausted {
            key: name.to_string(),
            attempts: DEFAULT_UPDATE_ATTEMPTS,
        })
    }
}
