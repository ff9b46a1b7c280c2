//! Application configuration types
//!
//! Contains all configuration structures for the Tessera binary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tessera_core::{ApprovalQueueConfig, ContextStoreConfig, OrchestratorConfig};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub context: ContextStoreConfig,
    #[serde(default)]
    pub approvals: ApprovalQueueConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Audit trail destination
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON lines file; `None` keeps the trail in memory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Settings of the simulated workers used by `tessera simulate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Conversation the simulated run belongs to
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    /// Time each simulated worker spends on a step
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

fn default_conversation_id() -> String {
    "cli".to_string()
}

fn default_step_delay_ms() -> u64 {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            conversation_id: default_conversation_id(),
            step_delay_ms: default_step_delay_ms(),
        }
    }
}
