//! The orchestration cycle: extract from the cache, generate and submit the
//! rest remotely, wait for the jobs, download and re-insert the results.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_core::{EventBus, RemoteChannel};
use simfarm_jobs::{JobState, JobTracker};
use simfarm_sim::{SimulationCache, SimulationSpec};

use crate::config::OrchestratorConfig;
use crate::events::OrchestratorEvent;
use crate::generator::{subgroup_count, GenerateRequest, ScriptGenerator};
use crate::state::RunState;

/// Outcome of one `run()` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The loop exited; the payload lists simulations that could not be
    /// produced (empty when extraction eventually succeeded for everyone).
    Completed(Vec<SimulationSpec>),
    /// A cancellation arrived during the wait loop; the run state can be
    /// persisted and replayed through `resume()`.
    Paused,
}

/// Cooperative cancellation flag shared with the embedder.
///
/// The orchestrator checks it once per wait-loop turn, the only point where
/// this core blocks; setting it elsewhere has no effect until then.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a pause at the next wait-loop turn.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` when a cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clears the flag.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

enum WaitResult {
    AllSucceeded,
    SomeFailed,
    Cancelled,
}

/// Drives the extract → generate → wait → download cycle for a batch of
/// simulations, with bounded retries across corruption and failure counters.
pub struct Orchestrator<C, S, G> {
    config: OrchestratorConfig,
    channel: C,
    cache: S,
    generator: G,
    tracker: JobTracker,
    events: EventBus<OrchestratorEvent>,
    cancel: CancelToken,
    state: RunState,
    to_generate: Vec<SimulationSpec>,
    remote_basedir: Option<String>,
    scratch_root: PathBuf,
    paused: bool,
}

impl<C, S, G> Orchestrator<C, S, G>
where
    C: RemoteChannel,
    S: SimulationCache,
    G: ScriptGenerator,
{
    /// Assembles an orchestrator around the three external collaborators.
    pub fn new(config: OrchestratorConfig, channel: C, cache: S, generator: G) -> Self {
        Self {
            config,
            channel,
            cache,
            generator,
            tracker: JobTracker::new(),
            events: EventBus::new(),
            cancel: CancelToken::new(),
            state: RunState::default(),
            to_generate: Vec::new(),
            remote_basedir: None,
            scratch_root: std::env::temp_dir(),
            paused: false,
        }
    }

    /// Overrides the local scratch root used for script and download staging.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Event bus carrying the per-step progress notifications.
    pub fn events(&mut self) -> &mut EventBus<OrchestratorEvent> {
        &mut self.events
    }

    /// Shared cancellation token (clone it into a signal handler).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns `true` while the orchestrator is paused.
    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Current configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Main loop: runs cycles until every simulation is extracted, the
    /// circuit breaker trips, or a cancellation pauses the run.
    ///
    /// Every cycle re-attempts extraction from the full original list: a
    /// later cycle may find previously unknown specs satisfied as a side
    /// effect of the ones generated before.
    pub fn run(&mut self, simulations: &[SimulationSpec]) -> Result<RunOutcome, SimError> {
        self.state = RunState {
            simulations_to_extract: simulations.to_vec(),
            ..RunState::default()
        };
        self.run_current()
    }

    /// Pauses the orchestrator. Fails with `already-paused` when it is.
    pub fn pause(&mut self) -> Result<(), SimError> {
        if self.paused {
            return Err(SimError::State(ErrorInfo::new(
                "already-paused",
                "the orchestrator is already paused",
            )));
        }
        self.paused = true;
        self.events.emit(&OrchestratorEvent::Paused);
        Ok(())
    }

    /// Resumes after a pause, replaying the run with the saved state.
    pub fn resume(&mut self) -> Result<RunOutcome, SimError> {
        if !self.paused {
            return Err(not_paused());
        }
        self.paused = false;
        self.cancel.reset();
        self.events.emit(&OrchestratorEvent::Resumed);
        self.run_current()
    }

    /// Persists the paused run state.
    pub fn save_state(&self, path: &Path) -> Result<(), SimError> {
        if !self.paused {
            return Err(not_paused());
        }
        self.state.store(path)
    }

    /// Loads a previously saved run state. Only allowed while paused.
    pub fn load_state(&mut self, path: &Path) -> Result<(), SimError> {
        if !self.paused {
            return Err(not_paused());
        }
        self.state = RunState::load(path)?;
        Ok(())
    }

    fn run_current(&mut self) -> Result<RunOutcome, SimError> {
        self.events.emit(&OrchestratorEvent::RunStart);
        while self.run_cycle()? {}
        if self.paused {
            return Ok(RunOutcome::Paused);
        }
        let unknown = self.state.unknown_simulations.clone();
        self.events.emit(&OrchestratorEvent::RunEnd {
            unknown: unknown.len(),
        });
        Ok(RunOutcome::Completed(unknown))
    }

    /// One cycle. Returns `true` to loop again.
    fn run_cycle(&mut self) -> Result<bool, SimError> {
        // A non-empty job list means we are resuming into an in-flight wait.
        if self.state.jobs_ids.is_empty() {
            self.extract_simulations()?;

            if self.state.unknown_simulations.is_empty() {
                return Ok(false);
            }
            if self.breaker_tripped() {
                return Ok(false);
            }

            self.generate_simulations()?;
        }

        match self.wait_for_jobs()? {
            WaitResult::Cancelled => {
                self.pause()?;
                return Ok(false);
            }
            WaitResult::SomeFailed => self.state.failures_counter += 1,
            WaitResult::AllSucceeded => {}
        }

        if !self.download_simulations()? {
            self.state.corruptions_counter += 1;
        }

        self.events.emit(&OrchestratorEvent::DeleteScripts);
        if let Some(dir) = self.state.remote_scripts_dir.take() {
            self.channel.delete_remote(&[dir])?;
        }

        Ok(true)
    }

    fn breaker_tripped(&self) -> bool {
        let corrupted = self.config.max_corrupted >= 0
            && self.state.corruptions_counter > self.config.max_corrupted;
        let failed =
            self.config.max_failures >= 0 && self.state.failures_counter > self.config.max_failures;
        corrupted || failed
    }

    /// Step 1: extract every known simulation; the misses become `unknown`.
    fn extract_simulations(&mut self) -> Result<(), SimError> {
        self.events.emit(&OrchestratorEvent::ExtractStart {
            total: self.state.simulations_to_extract.len(),
        });

        let mut unknown = Vec::new();
        for spec in &self.state.simulations_to_extract {
            if !self.cache.extract(spec)? {
                unknown.push(spec.clone());
            }
            self.events.emit(&OrchestratorEvent::ExtractProgress);
        }

        if self.config.generate_only {
            unknown.retain(|spec| !Path::new(&spec.folder).is_dir());
        }

        self.state.unknown_simulations = unknown;
        self.events.emit(&OrchestratorEvent::ExtractEnd);
        Ok(())
    }

    /// Step 3: render scripts for the unknown simulations, upload them,
    /// launch the top-level script and collect the job ids from its stdout.
    fn generate_simulations(&mut self) -> Result<(), SimError> {
        self.events.emit(&OrchestratorEvent::GenerateStart);

        let scripts_dir = tempfile::Builder::new()
            .prefix("simfarm-scripts-")
            .tempdir_in(&self.scratch_root)
            .map_err(|err| scratch_error("scripts", err))?;

        let remote_scripts_dir = format!("scripts_{:x}", unique_stamp());
        let remote_basedir = format!("simulations_{:x}", unique_stamp());

        self.to_generate = self.state.unknown_simulations.clone();
        for (k, spec) in self.to_generate.iter_mut().enumerate() {
            spec.folder = format!("{remote_basedir}/{k}");
        }

        let request = GenerateRequest {
            specs: &self.to_generate,
            scripts_dir: scripts_dir.path(),
            remote_dir: &remote_scripts_dir,
            subgroups: subgroup_count(self.to_generate.len(), self.config.max_simulations),
            output_filename: &self.config.jobs_output_filename,
        };
        let script = self.generator.generate(&request)?;

        let resolved = self
            .channel
            .send_dir(scripts_dir.path(), &remote_scripts_dir, true)?;
        let output = self.channel.execute(&script.launch_command)?;

        self.state.jobs_ids = output
            .iter()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        self.state.remote_scripts_dir = Some(resolved);
        self.remote_basedir = Some(remote_basedir);

        self.events.emit(&OrchestratorEvent::GenerateEnd {
            jobs: self.state.jobs_ids.len(),
        });
        Ok(())
    }

    /// Step 4: poll the status file until every job reaches a terminal
    /// state. A cancellation request converts into a pause, not a fault.
    fn wait_for_jobs(&mut self) -> Result<WaitResult, SimError> {
        self.events.emit(&OrchestratorEvent::WaitStart {
            jobs: self.state.jobs_ids.clone(),
        });

        self.tracker.clear();
        self.tracker.add(self.state.jobs_ids.iter().cloned(), true)?;
        self.tracker.link_to_file(&self.config.jobs_states_filename);

        let expected: BTreeSet<String> = self.state.jobs_ids.iter().cloned().collect();
        let mut previous: Option<BTreeMap<JobState, BTreeSet<String>>> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(WaitResult::Cancelled);
            }

            self.tracker.update_from_file(&mut self.channel)?;
            let snapshot = self.partition();

            if previous.as_ref() != Some(&snapshot) {
                self.events.emit(&OrchestratorEvent::WaitProgress {
                    waiting: snapshot.get(&JobState::Waiting).map_or(0, BTreeSet::len),
                    running: snapshot.get(&JobState::Running).map_or(0, BTreeSet::len),
                    succeed: snapshot.get(&JobState::Succeed).map_or(0, BTreeSet::len),
                    failed: snapshot.get(&JobState::Failed).map_or(0, BTreeSet::len),
                });

                let mut terminal = BTreeSet::new();
                for state in [JobState::Succeed, JobState::Failed] {
                    if let Some(names) = snapshot.get(&state) {
                        terminal.extend(names.iter().cloned());
                    }
                }
                if terminal == expected {
                    break;
                }
            }

            previous = Some(snapshot);
            thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
        }

        let failed = !self.tracker.jobs_with_states(&[JobState::Failed]).is_empty();

        self.tracker.clear();
        self.state.jobs_ids.clear();
        self.channel
            .delete_remote(&[self.config.jobs_states_filename.clone()])?;

        self.events.emit(&OrchestratorEvent::WaitEnd);
        Ok(if failed {
            WaitResult::SomeFailed
        } else {
            WaitResult::AllSucceeded
        })
    }

    fn partition(&self) -> BTreeMap<JobState, BTreeSet<String>> {
        let mut snapshot: BTreeMap<JobState, BTreeSet<String>> = BTreeMap::new();
        for state in [
            JobState::Waiting,
            JobState::Running,
            JobState::Succeed,
            JobState::Failed,
        ] {
            let names = self
                .tracker
                .jobs_with_states(&[state])
                .into_iter()
                .map(|record| record.name)
                .collect();
            snapshot.insert(state, names);
        }
        snapshot
    }

    /// Step 5: download each produced simulation, verify its integrity and
    /// insert it into the cache (or move it into place in generate-only
    /// mode). A remote folder that never materialized is a lost job: skipped
    /// without error, the spec simply stays unknown.
    fn download_simulations(&mut self) -> Result<bool, SimError> {
        let to_generate = std::mem::take(&mut self.to_generate);
        let destinations = self.state.unknown_simulations.clone();

        self.events.emit(&OrchestratorEvent::DownloadStart {
            total: to_generate.len(),
        });

        let mut success = true;

        for (generated, destination) in to_generate.iter().zip(destinations.iter()) {
            let staging = tempfile::Builder::new()
                .prefix("simfarm-download-")
                .tempdir_in(&self.scratch_root)
                .map_err(|err| scratch_error("download", err))?;

            match self.channel.receive_dir(&generated.folder, staging.path(), true) {
                Ok(()) => {
                    let mut local = generated.clone();
                    local.folder = staging.path().display().to_string();

                    if self.cache.check_integrity(&local)? {
                        if self.config.generate_only {
                            self.move_into_place(staging.path(), destination)?;
                        } else {
                            self.cache.add(&local)?;
                        }
                    } else {
                        success = false;
                    }
                }
                Err(err) if err.is_remote_path_missing() => {}
                Err(err) => return Err(err),
            }

            self.events.emit(&OrchestratorEvent::DownloadProgress);
        }

        if let Some(basedir) = self.remote_basedir.take() {
            self.channel.delete_remote(&[basedir])?;
        }

        self.events.emit(&OrchestratorEvent::DownloadEnd);
        Ok(success)
    }

    fn move_into_place(
        &self,
        staging: &Path,
        destination: &SimulationSpec,
    ) -> Result<(), SimError> {
        let dest_path = Path::new(&destination.folder);
        if let Some(parent) = dest_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| scratch_error("destination", err))?;
            }
        }
        fs::rename(staging, dest_path).map_err(|err| scratch_error("move", err))?;
        if !self.config.settings_file.is_empty() {
            destination.write_settings_file(&self.config.settings_file)?;
        }
        Ok(())
    }
}

fn not_paused() -> SimError {
    SimError::State(ErrorInfo::new(
        "not-paused",
        "the orchestrator is not paused",
    ))
}

fn scratch_error(stage: &str, err: std::io::Error) -> SimError {
    SimError::State(
        ErrorInfo::new("scratch-dir", err.to_string()).with_context("stage", stage),
    )
}

fn unique_stamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default()
}
