//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration from files and environment
pub fn load_config(extra: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. Local overrides (optional)
        .add_source(File::with_name("config/local").required(false));

    // 3. Explicit file (must exist when given)
    if let Some(path) = extra {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        // 4. Environment variables (highest priority), e.g. TESSERA_ORCHESTRATOR__MAX_CONCURRENCY
        .add_source(
            Environment::with_prefix("TESSERA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Capability;

    #[test]
    fn test_embedded_defaults_parse() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.orchestrator.max_concurrency, 0);
        assert_eq!(config.orchestrator.retry.max_attempts, 2);
        assert_eq!(
            config.orchestrator.capability_concurrency.get(&Capability::Compliance),
            Some(&4)
        );
        assert!(config.orchestrator.is_llm_backed(Capability::Knowledge));
        assert!(config.orchestrator.routing.confirm_destructive);
        assert_eq!(config.approvals.retention_secs, 3600);
        assert!(config.audit.path.is_none());
        assert_eq!(config.simulation.conversation_id, "cli");
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(
            &path,
            "[orchestrator]\nmax_concurrency = 3\n\n[audit]\npath = \"audit.jsonl\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.orchestrator.max_concurrency, 3);
        assert_eq!(config.orchestrator.token_budget, 8000);
        assert_eq!(
            config.audit.path.as_deref(),
            Some(Path::new("audit.jsonl"))
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
