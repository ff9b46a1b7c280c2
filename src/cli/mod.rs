//! CLI module for Tessera
//!
//! Provides commands over the orchestration core:
//! - `plan`: build and validate a plan for an intent
//! - `classify`: score remediation candidates and show their routing
//! - `simulate`: execute an intent against simulated workers
//! - `show-config`: print the effective configuration

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::runtime::AppConfig;

pub mod classify;
pub mod config;
pub mod plan;
pub mod simulate;

/// Tessera multi-agent orchestrator CLI
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Multi-agent cloud operations orchestrator")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over config/local.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the validated plan for an intent
    Plan {
        /// Intent JSON file
        #[arg(long)]
        intent: PathBuf,
    },
    /// Score remediation candidates and show their routing
    Classify {
        /// JSON file with an array of remediation candidates
        #[arg(long)]
        candidates: PathBuf,
    },
    /// Execute an intent against simulated workers
    Simulate {
        /// Intent JSON file
        #[arg(long)]
        intent: PathBuf,
        /// Capability whose worker reports an outage (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,
        /// Resource whose mutation is rejected (repeatable)
        #[arg(long = "reject")]
        reject: Vec<String>,
        /// Print the response as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Plan { intent }) => plan::run(&config, &intent),
        Some(Commands::Classify { candidates }) => classify::run(&config, &candidates),
        Some(Commands::Simulate {
            intent,
            fail,
            reject,
            json,
        }) => simulate::run(&config, &intent, &fail, reject, json).await,
        Some(Commands::ShowConfig) => config::run(&config),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Read and parse a JSON input file
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_simulate_flags() {
        let cli = Cli::try_parse_from([
            "tessera",
            "simulate",
            "--intent",
            "intent.json",
            "--fail",
            "compliance",
            "--fail",
            "cost",
            "--reject",
            "st-logs-01",
            "--json-logs",
        ])
        .unwrap();

        assert!(cli.json_logs);
        match cli.command {
            Some(Commands::Simulate {
                intent, fail, reject, json,
            }) => {
                assert_eq!(intent, PathBuf::from("intent.json"));
                assert_eq!(fail, vec!["compliance", "cost"]);
                assert_eq!(reject, vec!["st-logs-01"]);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_intent_for_plan() {
        assert!(Cli::try_parse_from(["tessera", "plan"]).is_err());
    }

    #[test]
    fn test_read_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = read_json::<serde_json::Value>(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("intent.json"));
    }
}
