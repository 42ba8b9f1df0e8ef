use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Aggregation cycle length in seconds (also the sampling interval
    /// passed to each client)
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval: u64,
    /// Emit an explicit zero report when the registry has no sessions,
    /// instead of skipping the cycle's report
    #[serde(default)]
    pub report_empty_cycles: bool,
    /// Maximum clients sampled concurrently within one cycle
    #[serde(default = "default_sample_batch_size")]
    pub sample_batch_size: usize,
}

fn default_cycle_interval() -> u64 {
    10 // 10 seconds
}

fn default_sample_batch_size() -> usize {
    256
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("stats.cycle_interval", 10)?
            .set_default("stats.report_empty_cycles", false)?
            .set_default("stats.sample_batch_size", 256)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // STATS_CYCLE_INTERVAL, STATS_REPORT_EMPTY_CYCLES, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cycle_interval: default_cycle_interval(),
            report_empty_cycles: false,
            sample_batch_size: default_sample_batch_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let stats = StatsConfig::default();
        assert_eq!(stats.cycle_interval, 10);
        assert!(!stats.report_empty_cycles);
        assert_eq!(stats.sample_batch_size, 256);
    }
}
