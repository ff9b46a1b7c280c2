//! `tessera show-config`

use anyhow::{Context, Result};

use crate::runtime::AppConfig;

pub fn run(config: &AppConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to serialize config")?;
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_round_trips_through_toml() {
        let mut config = AppConfig::default();
        config.orchestrator.max_concurrency = 6;
        config.simulation.step_delay_ms = 5;

        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.orchestrator, config.orchestrator);
        assert_eq!(parsed.simulation.step_delay_ms, 5);
    }
}
