//! Shared Context Store - per-conversation state shared across workers
//!
//! Workers never talk to each other. Whatever one worker produces for another
//! (inventories, findings, remediation results, snapshots) goes through this
//! store, keyed by conversation ID and a logical name.
//!
//! - Writes are last-writer-wins per key, totally ordered by a per-conversation
//!   generation counter.
//! - Writers that care about lost updates use compare-and-set against the
//!   generation they last observed.
//! - Absence of a key is a normal, checked state.

mod handle;
mod store;
mod types;

pub use handle::ContextHandle;
pub use store::{spawn_expiry_sweeper, SharedContextStore};
pub use types::{ContextEntry, ContextError, ContextKey, ContextStoreConfig, Generation};

/// Well-known shared context key names
pub mod keys {
    /// Inventory produced by discovery
    pub const RESOURCE_INVENTORY: &str = "resource-inventory";
    /// Compliance findings
    pub const FINDINGS: &str = "findings";
    /// Findings paired with proposed fixes
    pub const REMEDIATION_CANDIDATES: &str = "remediation-candidates";
    /// Outcome of a remediation run
    pub const REMEDIATION_RESULTS: &str = "remediation-results";
    /// Prefix for per-step rollback snapshots (`remediation-snapshot/<step>`)
    pub const REMEDIATION_SNAPSHOT: &str = "remediation-snapshot";
    /// Candidates handed to template generation
    pub const DELEGATED_REMEDIATIONS: &str = "delegated-remediations";
    /// Cost estimation output
    pub const COST_ESTIMATE: &str = "cost-estimate";
    /// Environment lifecycle output
    pub const ENVIRONMENT_STATE: &str = "environment-state";
    /// Knowledge lookup output
    pub const KNOWLEDGE_ANSWER: &str = "knowledge-answer";

    /// Snapshot key for one mutating step
    #[must_use]
    pub fn snapshot_for(step_id: &str) -> String {
        format!("{}/{}", REMEDIATION_SNAPSHOT, step_id)
    }
}
