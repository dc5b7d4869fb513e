//! Simulation orchestration.
//!
//! Given a batch of [`SimulationSpec`](simfarm_sim::SimulationSpec)s, the
//! [`Orchestrator`] extracts what the cache already knows, generates and
//! submits the rest through a [`RemoteChannel`](simfarm_core::RemoteChannel),
//! waits for the jobs and downloads the results, looping until everything is
//! produced or the corruption/failure breaker trips.

#![deny(missing_docs)]

pub mod config;
pub mod events;
pub mod generator;
pub mod orchestrator;
pub mod state;

pub use config::OrchestratorConfig;
pub use events::OrchestratorEvent;
pub use generator::{subgroup_count, GenerateRequest, LaunchScript, ScriptGenerator};
pub use orchestrator::{CancelToken, Orchestrator, RunOutcome};
pub use state::RunState;
