//! Script generation seam.
//!
//! The templating engine producing the actual scripts lives outside this
//! workspace; the orchestrator hands it a request and receives the command
//! launching the generated top-level script.

use std::path::Path;

use simfarm_core::errors::SimError;
use simfarm_sim::SimulationSpec;

/// Everything the generator needs to render one batch of scripts.
#[derive(Debug)]
pub struct GenerateRequest<'a> {
    /// Simulations to generate, folders already pointed at the remote scratch.
    pub specs: &'a [SimulationSpec],
    /// Local directory to render the scripts into.
    pub scripts_dir: &'a Path,
    /// Remote directory the scripts will be uploaded to.
    pub remote_dir: &'a str,
    /// Number of job subgroups the batch is partitioned into.
    pub subgroups: usize,
    /// Filename each job should write its output to.
    pub output_filename: &'a str,
}

/// Handle on the generated top-level launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchScript {
    /// Command to execute remotely. Its stdout is the authoritative job-id
    /// list, one identifier per line.
    pub launch_command: String,
}

/// Renders submission scripts for a batch of simulations.
pub trait ScriptGenerator {
    /// Generates the scripts and returns the launcher handle.
    fn generate(&mut self, request: &GenerateRequest<'_>) -> Result<LaunchScript, SimError>;
}

impl<F> ScriptGenerator for F
where
    F: FnMut(&GenerateRequest<'_>) -> Result<LaunchScript, SimError>,
{
    fn generate(&mut self, request: &GenerateRequest<'_>) -> Result<LaunchScript, SimError> {
        self(request)
    }
}

/// Number of job subgroups for a batch, ceiling-divided by the batch size.
/// A size of zero means the whole batch forms one subgroup.
pub fn subgroup_count(simulations: usize, max_simulations: usize) -> usize {
    if simulations == 0 {
        0
    } else if max_simulations == 0 {
        1
    } else {
        (simulations + max_simulations - 1) / max_simulations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subgroups_are_ceiling_divided() {
        assert_eq!(subgroup_count(0, 4), 0);
        assert_eq!(subgroup_count(7, 0), 1);
        assert_eq!(subgroup_count(7, 4), 2);
        assert_eq!(subgroup_count(8, 4), 2);
        assert_eq!(subgroup_count(9, 4), 3);
    }
}
