use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Namespaced context key: conversation + logical name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    /// Conversation the key belongs to
    pub conversation_id: String,
    /// Logical name (e.g. "findings")
    pub name: String,
}

impl ContextKey {
    /// Create a new key
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.conversation_id, self.name)
    }
}

/// Write generation of a key. `Generation::ABSENT` means the key does not exist.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    /// Generation of a key that has never been written (or was removed)
    pub const ABSENT: Generation = Generation(0);

    /// Whether this generation denotes an absent key
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Most recently written value of a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Stored value
    pub value: serde_json::Value,
    /// Generation assigned by the write
    pub generation: Generation,
    /// Step or component that wrote the value
    pub writer: Option<String>,
    /// When the value was written
    pub written_at: DateTime<Utc>,
}

/// Store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStoreConfig {
    /// Idle time after which a conversation's context is torn down
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// How often the expiry sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for ContextStoreConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Shared context errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Compare-and-set lost against a newer writer
    #[error("stale write to '{key}': expected generation {expected}, found {actual}")]
    GenerationMismatch {
        /// Key name
        key: String,
        /// Generation the writer asserted
        expected: Generation,
        /// Generation actually stored
        actual: Generation,
    },

    /// A step wrote a key outside its declared write-set
    #[error("step '{step_id}' did not declare a write to '{key}'")]
    UndeclaredWrite {
        /// Offending step
        step_id: String,
        /// Key name
        key: String,
    },

    /// Read-modify-write kept losing races
    #[error("gave up writing '{key}' after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// Key name
        key: String,
        /// Attempts made
        attempts: u32,
    },

    /// Stored value could not be decoded into the requested type
    #[error("value for '{key}' has unexpected shape: {message}")]
    Decode {
        /// Key name
        key: String,
        /// Decoder message
        message: String,
    },
}
