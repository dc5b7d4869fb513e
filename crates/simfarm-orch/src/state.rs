//! Pause-state persistence.
//!
//! Resuming replays `run()` with the saved extraction list; nothing is
//! partially consumed, so the snapshot is a flat record of the run fields.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_sim::SimulationSpec;

/// Serializable snapshot of one orchestration run.
///
/// Every field is required when loading; a blob missing a key fails with
/// the `state-format` code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    /// Full original extraction list; replayed in full on resume.
    pub simulations_to_extract: Vec<SimulationSpec>,
    /// Integrity failures accumulated so far, monotonic within a run.
    pub corruptions_counter: i64,
    /// Job failures accumulated so far, monotonic within a run.
    pub failures_counter: i64,
    /// Simulations the cache could not provide in the latest cycle.
    pub unknown_simulations: Vec<SimulationSpec>,
    /// Identifiers of jobs still being waited on.
    pub jobs_ids: Vec<String>,
    /// Remote scratch directory holding the generated scripts.
    pub remote_scripts_dir: Option<String>,
}

impl RunState {
    /// Restores a snapshot from disk.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            SimError::State(
                ErrorInfo::new("state-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            SimError::State(
                ErrorInfo::new("state-format", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Writes the snapshot to disk.
    pub fn store(&self, path: &Path) -> Result<(), SimError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                SimError::State(
                    ErrorInfo::new("state-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            SimError::State(ErrorInfo::new("state-serialize", err.to_string()))
        })?;
        fs::write(path, json).map_err(|err| {
            SimError::State(
                ErrorInfo::new("state-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fail_to_load() {
        let blob = r#"{"simulations_to_extract": [], "corruptions_counter": 0}"#;
        let err = serde_json::from_str::<RunState>(blob).unwrap_err();
        assert!(err.to_string().contains("missing field"));
    }
}
