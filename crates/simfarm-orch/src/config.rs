//! YAML-configurable orchestrator options.

use serde::{Deserialize, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};

/// Options governing one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Name of the settings file written next to each produced simulation.
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
    /// Maximum tolerated corruption count before the cycle aborts.
    /// Negative means unbounded.
    #[serde(default = "default_max_corrupted")]
    pub max_corrupted: i64,
    /// Maximum tolerated failure count before the cycle aborts.
    /// Negative means unbounded.
    #[serde(default)]
    pub max_failures: i64,
    /// Remote file the job tracker polls for job states.
    #[serde(default = "default_jobs_states_filename")]
    pub jobs_states_filename: String,
    /// Filename each remote job writes its output to.
    #[serde(default = "default_jobs_output_filename")]
    pub jobs_output_filename: String,
    /// Generate simulations without adding them to the cache; results are
    /// moved straight into their destination folders.
    #[serde(default)]
    pub generate_only: bool,
    /// Maximum simulations per job subgroup (0 = a single subgroup).
    #[serde(default)]
    pub max_simulations: usize,
    /// Idle delay of the wait loop, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_settings_file() -> String {
    "settings.json".to_string()
}

fn default_max_corrupted() -> i64 {
    -1
}

fn default_jobs_states_filename() -> String {
    "jobs.txt".to_string()
}

fn default_jobs_output_filename() -> String {
    "job.out".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            settings_file: default_settings_file(),
            max_corrupted: default_max_corrupted(),
            max_failures: 0,
            jobs_states_filename: default_jobs_states_filename(),
            jobs_output_filename: default_jobs_output_filename(),
            generate_only: false,
            max_simulations: 0,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Parses a configuration from YAML; absent fields take their defaults.
    pub fn from_yaml_str(source: &str) -> Result<Self, SimError> {
        serde_yaml::from_str(source)
            .map_err(|err| SimError::Serde(ErrorInfo::new("config-parse", err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_table() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.settings_file, "settings.json");
        assert_eq!(config.max_corrupted, -1);
        assert_eq!(config.max_failures, 0);
        assert_eq!(config.jobs_states_filename, "jobs.txt");
        assert_eq!(config.jobs_output_filename, "job.out");
        assert!(!config.generate_only);
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let config = OrchestratorConfig::from_yaml_str("max_failures: 3\ngenerate_only: true\n")
            .unwrap();
        assert_eq!(config.max_failures, 3);
        assert!(config.generate_only);
        assert_eq!(config.max_corrupted, -1);
    }
}
