#![deny(missing_docs)]
#![doc = "Simulation settings model for simfarm: typed settings sets with deferred expression values, command-line rendering, canonical fingerprints and the cache seam."]

pub mod hash;
pub mod settings;
pub mod spec;

pub use hash::{stable_hash_string, to_canonical_json_bytes};
pub use settings::{
    format_number, Setting, SettingCoordinate, SettingValue, SettingsSet, DEFAULT_SETTING_PATTERN,
};
pub use spec::{SimulationCache, SimulationSpec};
