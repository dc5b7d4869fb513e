//! The simulation specification: destination folder plus ordered settings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};

use crate::hash::stable_hash_string;
use crate::settings::{Setting, SettingCoordinate, SettingValue, SettingsSet};

/// A fully parameterized simulation.
///
/// `Clone` is a deep copy: mutating a clone never affects the simulation it
/// was derived from, so specs sharing defaults can diverge safely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSpec {
    /// Destination folder, local or remote-relative.
    pub folder: String,
    /// Ordered settings sets.
    pub sets: Vec<SettingsSet>,
}

impl SimulationSpec {
    /// Creates a spec with the given destination folder and no settings.
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            sets: Vec::new(),
        }
    }

    /// Appends a settings set and returns the spec for chaining.
    pub fn with_set(mut self, set: SettingsSet) -> Self {
        self.sets.push(set);
        self
    }

    /// Looks up a setting by coordinates.
    pub fn get_setting(&self, coords: &SettingCoordinate) -> Option<&Setting> {
        self.sets
            .iter()
            .find(|set| set.name == coords.set && set.index == coords.set_index)?
            .settings
            .iter()
            .find(|setting| setting.name == coords.name)
    }

    /// Looks up a setting by coordinates, mutably.
    pub fn get_setting_mut(&mut self, coords: &SettingCoordinate) -> Option<&mut Setting> {
        self.sets
            .iter_mut()
            .find(|set| set.name == coords.set && set.index == coords.set_index)?
            .settings
            .iter_mut()
            .find(|setting| setting.name == coords.name)
    }

    /// Overwrites the value of the addressed setting.
    pub fn set_value(
        &mut self,
        coords: &SettingCoordinate,
        value: SettingValue,
    ) -> Result<(), SimError> {
        match self.get_setting_mut(coords) {
            Some(setting) => {
                setting.value = value;
                Ok(())
            }
            None => Err(crate::settings::unknown_setting_error(coords)),
        }
    }

    /// Builds the command line launching this simulation: the executable
    /// followed by every non-excluded setting rendered through its pattern.
    pub fn command_line(&self, exec: &str) -> Result<String, SimError> {
        let mut parts = vec![exec.to_string()];
        for set in &self.sets {
            for setting in &set.settings {
                if !setting.exclude {
                    parts.push(setting.render()?);
                }
            }
        }
        Ok(parts.join(" "))
    }

    /// Content-addressed cache key derived from the resolved, non-excluded
    /// settings. Deferred expressions are resolved first so symbolically and
    /// numerically identical specs share a fingerprint.
    pub fn fingerprint(&self) -> Result<String, SimError> {
        let mut identity: Vec<(String, usize, Vec<(String, SettingValue)>)> = Vec::new();
        for set in &self.sets {
            let mut entries = Vec::new();
            for setting in &set.settings {
                if !setting.exclude {
                    entries.push((setting.name.clone(), setting.value.resolve()?));
                }
            }
            identity.push((set.name.clone(), set.index, entries));
        }
        stable_hash_string(&identity)
    }

    /// Writes the settings as JSON into the simulation's folder.
    pub fn write_settings_file(&self, filename: &str) -> Result<(), SimError> {
        self.write_settings_file_in(Path::new(&self.folder), filename)
    }

    /// Writes the settings as JSON into an explicit folder.
    pub fn write_settings_file_in(&self, folder: &Path, filename: &str) -> Result<(), SimError> {
        let path = folder.join(filename);
        let json = serde_json::to_string_pretty(&self.sets)
            .map_err(|err| SimError::Serde(ErrorInfo::new("settings-serialize", err.to_string())))?;
        fs::write(&path, json).map_err(|err| {
            SimError::Serde(
                ErrorInfo::new("settings-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Narrow interface onto the content-addressed simulation store.
///
/// The store itself (archives, the name/settings dictionary) lives outside
/// this workspace; the orchestrator only needs these four operations.
pub trait SimulationCache {
    /// Attempts to materialize a known simulation into `spec.folder`.
    /// Returns `false` on a cache miss.
    fn extract(&mut self, spec: &SimulationSpec) -> Result<bool, SimError>;

    /// Adds a freshly produced simulation to the store.
    fn add(&mut self, spec: &SimulationSpec) -> Result<(), SimError>;

    /// Verifies that the simulation folder holds a complete result.
    fn check_integrity(&mut self, spec: &SimulationSpec) -> Result<bool, SimError>;

    /// Removes a simulation from the store.
    fn delete(&mut self, spec: &SimulationSpec) -> Result<(), SimError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Setting;

    fn sample_spec() -> SimulationSpec {
        SimulationSpec::new("out/0").with_set(SettingsSet {
            name: "solver".into(),
            index: 0,
            settings: vec![Setting::new("tol", SettingValue::Number(0.01))],
        })
    }

    #[test]
    fn clones_are_independent() {
        let original = sample_spec();
        let mut copy = original.clone();
        copy.set_value(
            &SettingCoordinate::new("solver", "tol"),
            SettingValue::Number(1.0),
        )
        .unwrap();
        let coords = SettingCoordinate::new("solver", "tol");
        assert_eq!(
            original.get_setting(&coords).unwrap().value,
            SettingValue::Number(0.01)
        );
        assert_eq!(
            copy.get_setting(&coords).unwrap().value,
            SettingValue::Number(1.0)
        );
    }

    #[test]
    fn fingerprint_ignores_folder_and_resolves_values() {
        let a = sample_spec();
        let mut b = sample_spec();
        b.folder = "elsewhere".into();
        b.set_value(
            &SettingCoordinate::new("solver", "tol"),
            SettingValue::Str("((0.02 / 2))".into()),
        )
        .unwrap();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn excluded_settings_do_not_define_identity() {
        let mut a = sample_spec();
        a.sets[0].settings.push(Setting {
            name: "comment".into(),
            value: SettingValue::Str("run 1".into()),
            pattern: None,
            exclude: true,
        });
        let b = sample_spec();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(
            a.command_line("./model").unwrap(),
            "./model -tol 0.01"
        );
    }
}
