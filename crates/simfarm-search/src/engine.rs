//! The search engine: recursive map walk, leaf evaluation and save hooks.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_core::{EventBus, RemoteChannel};
use simfarm_orch::{Orchestrator, RunOutcome, ScriptGenerator};
use simfarm_sim::{SettingCoordinate, SettingValue, SimulationCache, SimulationSpec};

use crate::events::SearchEvent;
use crate::map::{build_values, SweepNode};
use crate::refine::SearchRecord;
use crate::stop::check_stop;

/// Whether the evaluation callback runs once per simulation or once for a
/// whole leaf batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// One evaluation per simulation; stop conditions are checked after each.
    #[default]
    Each,
    /// One evaluation for the whole batch.
    Group,
}

/// Produces the scalar evaluation of one simulation (or one batch, in GROUP
/// mode, where the slice holds the whole batch).
pub trait Evaluator {
    /// Evaluates the given simulations at the given sweep depth.
    fn evaluate(&mut self, specs: &[SimulationSpec], depth: usize) -> Result<f64, SimError>;
}

impl<F> Evaluator for F
where
    F: FnMut(&[SimulationSpec], usize) -> Result<f64, SimError>,
{
    fn evaluate(&mut self, specs: &[SimulationSpec], depth: usize) -> Result<f64, SimError> {
        self(specs, depth)
    }
}

/// Produces the simulations of a leaf batch, returning the ones that could
/// not be produced.
pub trait SimulationRunner {
    /// Runs a batch and returns the specs left unknown.
    fn run_batch(&mut self, specs: &[SimulationSpec]) -> Result<Vec<SimulationSpec>, SimError>;
}

impl<F> SimulationRunner for F
where
    F: FnMut(&[SimulationSpec]) -> Result<Vec<SimulationSpec>, SimError>,
{
    fn run_batch(&mut self, specs: &[SimulationSpec]) -> Result<Vec<SimulationSpec>, SimError> {
        self(specs)
    }
}

impl<C, S, G> SimulationRunner for Orchestrator<C, S, G>
where
    C: RemoteChannel,
    S: SimulationCache,
    G: ScriptGenerator,
{
    fn run_batch(&mut self, specs: &[SimulationSpec]) -> Result<Vec<SimulationSpec>, SimError> {
        match self.run(specs)? {
            RunOutcome::Completed(unknown) => Ok(unknown),
            RunOutcome::Paused => Err(SimError::State(ErrorInfo::new(
                "run-paused",
                "the orchestrator paused in the middle of a sweep",
            ))),
        }
    }
}

/// One setting assignment applied by the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedSetting {
    /// Coordinates of the altered setting.
    #[serde(flatten)]
    pub coordinate: SettingCoordinate,
    /// Value assigned to it, possibly still symbolic.
    pub value: SettingValue,
}

/// Result of one stop-condition check, attached to the record it followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopCheck {
    /// Depth of the level whose condition was checked.
    pub depth: usize,
    /// Whether the condition fired.
    pub fired: bool,
}

/// One evaluated leaf entry of the walk output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Settings applied to the simulation (first of the batch in GROUP mode).
    pub settings: Vec<AppliedSetting>,
    /// Per-simulation settings of the whole batch, GROUP mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_settings: Option<Vec<Vec<AppliedSetting>>>,
    /// Scalar evaluation result.
    pub evaluation: f64,
    /// Stop checks performed right after this record, shallowest last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stops: Vec<StopCheck>,
    /// Folder the simulation was saved to, when a save hook is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
}

/// Output of one full map walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapOutput {
    /// Map declaration the walk followed.
    pub map: SweepNode,
    /// Ordered leaf records.
    pub records: Vec<EvaluationRecord>,
}

pub(crate) struct SaveHook {
    pub(crate) root: PathBuf,
    pub(crate) callback: Box<dyn FnMut(&SimulationSpec, &Path) -> Result<(), SimError>>,
}

/// Walks a sweep map, evaluating each leaf combination through a
/// [`SimulationRunner`] and an [`Evaluator`], and refines discovered stop
/// crossings by root-finding (see [`search`](SearchEngine::search)).
pub struct SearchEngine<R, E> {
    pub(crate) runner: R,
    pub(crate) evaluator: E,
    pub(crate) default_spec: SimulationSpec,
    pub(crate) map: Option<SweepNode>,
    pub(crate) output: Option<MapOutput>,
    pub(crate) mode: EvaluationMode,
    pub(crate) save: Option<SaveHook>,
    pub(crate) tolerance: f64,
    pub(crate) itermax: usize,
    pub(crate) events: EventBus<SearchEvent>,
    pub(crate) searches: Vec<SearchRecord>,
    pub(crate) scratch_root: PathBuf,
}

impl<R, E> SearchEngine<R, E>
where
    R: SimulationRunner,
    E: Evaluator,
{
    /// Assembles an engine around a runner, an evaluator and the default
    /// simulation every sweep entry derives from.
    pub fn new(runner: R, evaluator: E, default_spec: SimulationSpec) -> Self {
        Self {
            runner,
            evaluator,
            default_spec,
            map: None,
            output: None,
            mode: EvaluationMode::Each,
            save: None,
            tolerance: 1e-5,
            itermax: 100,
            events: EventBus::new(),
            searches: Vec::new(),
            scratch_root: std::env::temp_dir(),
        }
    }

    /// Overrides the local scratch root used for leaf simulation folders.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Sets the map to follow.
    pub fn set_map(&mut self, map: SweepNode) {
        self.map = Some(map);
    }

    /// Current map declaration.
    pub fn map(&self) -> Option<&SweepNode> {
        self.map.as_ref()
    }

    /// Sets the evaluation mode.
    pub fn set_mode(&mut self, mode: EvaluationMode) {
        self.mode = mode;
    }

    /// Installs a save hook: every generated simulation is handed to the
    /// callback inside a fresh numbered subfolder of `root`, next to a
    /// written settings file.
    pub fn set_save_hook(
        &mut self,
        root: impl Into<PathBuf>,
        callback: impl FnMut(&SimulationSpec, &Path) -> Result<(), SimError> + 'static,
    ) {
        self.save = Some(SaveHook {
            root: root.into(),
            callback: Box::new(callback),
        });
    }

    /// Removes the save hook.
    pub fn clear_save_hook(&mut self) {
        self.save = None;
    }

    /// Convergence tolerance of the refinement loop.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Iteration cap of the refinement loop.
    pub fn set_itermax(&mut self, itermax: usize) {
        self.itermax = itermax;
    }

    /// Event bus carrying walk and search progress notifications.
    pub fn events(&mut self) -> &mut EventBus<SearchEvent> {
        &mut self.events
    }

    /// Output of the latest walk.
    pub fn output(&self) -> Option<&MapOutput> {
        self.output.as_ref()
    }

    /// Refinement details of the latest [`search`](SearchEngine::search).
    pub fn searches(&self) -> &[SearchRecord] {
        &self.searches
    }

    /// Walks the whole map and records one entry per evaluated leaf.
    pub fn follow_map(&mut self) -> Result<&MapOutput, SimError> {
        let map = self.map.clone().ok_or_else(map_missing)?;
        self.events.emit(&SearchEvent::MapStart);
        let records = self.walk(&map, &[], 0)?;
        self.events.emit(&SearchEvent::MapEnd);
        Ok(self.output.insert(MapOutput { map, records }))
    }

    /// One level of the walk. Each call owns its result vector; siblings
    /// never share an accumulator.
    fn walk(
        &mut self,
        node: &SweepNode,
        current: &[AppliedSetting],
        depth: usize,
    ) -> Result<Vec<EvaluationRecord>, SimError> {
        let values = build_values(&node.values)?;
        let deltas = values
            .iter()
            .map(|value| apply_level(node, value, current))
            .collect::<Result<Vec<_>, _>>()?;

        self.events.emit(&SearchEvent::ComponentStart {
            depth,
            count: deltas.len(),
        });

        let mut records = Vec::new();

        if let Some(child) = node.foreach.as_deref() {
            let mut evaluations = Vec::new();
            for delta in &deltas {
                let mut sub = self.walk(child, delta, depth + 1)?;
                records.append(&mut sub);
                self.events.emit(&SearchEvent::ComponentProgress { depth });

                let Some(last) = records.last_mut() else {
                    continue;
                };
                evaluations.push(last.evaluation);

                if let Some(stop) = &node.stop {
                    let fired = check_stop(stop, &evaluations)?;
                    last.stops.push(StopCheck { depth, fired });
                    if fired {
                        self.events.emit(&SearchEvent::Stopped);
                        break;
                    }
                }
            }
        } else {
            records = self.evaluate_leaf(node, &deltas, depth)?;
        }

        self.events.emit(&SearchEvent::ComponentEnd { depth });
        Ok(records)
    }

    /// Materializes and evaluates one leaf batch. The simulation folders
    /// live in a scratch directory deleted when the batch is done.
    fn evaluate_leaf(
        &mut self,
        node: &SweepNode,
        deltas: &[Vec<AppliedSetting>],
        depth: usize,
    ) -> Result<Vec<EvaluationRecord>, SimError> {
        let scratch = tempfile::Builder::new()
            .prefix("simfarm-sweep-")
            .tempdir_in(&self.scratch_root)
            .map_err(|err| {
                SimError::Search(ErrorInfo::new("scratch-dir", err.to_string()))
            })?;
        let specs = self.build_specs(deltas, scratch.path())?;

        let mut records = Vec::new();

        match self.mode {
            EvaluationMode::Each => {
                let mut evaluations = Vec::new();
                for (spec, delta) in specs.iter().zip(deltas) {
                    self.run_required(std::slice::from_ref(spec))?;
                    let saved = self.save_simulations(std::slice::from_ref(spec))?;
                    let evaluation = self.evaluator.evaluate(std::slice::from_ref(spec), depth)?;
                    evaluations.push(evaluation);

                    let mut record = EvaluationRecord {
                        settings: delta.clone(),
                        group_settings: None,
                        evaluation,
                        stops: Vec::new(),
                        saved_to: saved.and_then(|mut folders| folders.pop()),
                    };

                    self.events.emit(&SearchEvent::ComponentProgress { depth });

                    let mut fired = false;
                    if let Some(stop) = &node.stop {
                        fired = check_stop(stop, &evaluations)?;
                        record.stops.push(StopCheck { depth, fired });
                    }
                    records.push(record);
                    if fired {
                        self.events.emit(&SearchEvent::Stopped);
                        break;
                    }
                }
            }
            EvaluationMode::Group => {
                self.run_required(&specs)?;
                let saved = self.save_simulations(&specs)?;
                let evaluation = self.evaluator.evaluate(&specs, depth)?;
                let saved_to = saved.and_then(|folders| {
                    folders
                        .first()
                        .and_then(|folder| folder.parent().map(Path::to_path_buf))
                });
                records.push(EvaluationRecord {
                    settings: deltas.first().cloned().unwrap_or_default(),
                    group_settings: Some(deltas.to_vec()),
                    evaluation,
                    stops: Vec::new(),
                    saved_to,
                });
            }
        }

        Ok(records)
    }

    fn build_specs(
        &self,
        deltas: &[Vec<AppliedSetting>],
        dir: &Path,
    ) -> Result<Vec<SimulationSpec>, SimError> {
        deltas
            .iter()
            .enumerate()
            .map(|(k, delta)| {
                let mut spec = self.default_spec.clone();
                spec.folder = dir.join(k.to_string()).display().to_string();
                for applied in delta {
                    spec.set_value(&applied.coordinate, applied.value.clone())?;
                }
                Ok(spec)
            })
            .collect()
    }

    /// Runs a batch and insists on every simulation being produced: a sweep
    /// leaf without usable data cannot be evaluated.
    fn run_required(&mut self, specs: &[SimulationSpec]) -> Result<(), SimError> {
        let unknown = self.runner.run_batch(specs)?;
        if !unknown.is_empty() {
            return Err(SimError::Search(
                ErrorInfo::new(
                    "simulations-missing",
                    "some simulations of the batch could not be produced",
                )
                .with_context("count", unknown.len().to_string()),
            ));
        }
        Ok(())
    }

    fn save_simulations(
        &mut self,
        specs: &[SimulationSpec],
    ) -> Result<Option<Vec<PathBuf>>, SimError> {
        let Some(hook) = self.save.as_mut() else {
            return Ok(None);
        };

        // Batches are numbered by the current entry count of the save root.
        let n = fs::read_dir(&hook.root)
            .map(|entries| entries.count())
            .unwrap_or(0);
        let batch = hook.root.join(n.to_string());

        let mut folders = Vec::with_capacity(specs.len());
        for (k, spec) in specs.iter().enumerate() {
            let subfolder = batch.join(k.to_string());
            fs::create_dir_all(&subfolder).map_err(|err| {
                SimError::Search(
                    ErrorInfo::new("save-folder", err.to_string())
                        .with_context("path", subfolder.display().to_string()),
                )
            })?;
            (hook.callback)(spec, &subfolder)?;
            spec.write_settings_file_in(&subfolder, "settings.json")?;
            folders.push(subfolder);
        }
        Ok(Some(folders))
    }

    /// Returns, for each record whose stop fired at the given depth, the
    /// applied-settings prefix up to that depth and the record index.
    pub fn find_stops(
        &self,
        depth: usize,
    ) -> Result<Vec<(Vec<AppliedSetting>, usize)>, SimError> {
        let map = self.map.as_ref().ok_or_else(map_missing)?;
        let levels = map.depths();
        let level = levels
            .get(depth)
            .ok_or_else(|| depth_not_found(depth))?;
        if level.stop.is_none() {
            return Err(stop_not_found(depth));
        }
        let output = self.output.as_ref().ok_or_else(|| {
            SimError::Search(ErrorInfo::new(
                "map-not-followed",
                "follow the map before looking for stops",
            ))
        })?;

        let k_max = levels[..depth]
            .iter()
            .map(|l| l.settings.len())
            .sum::<usize>()
            + level.settings.len();

        let mut found = Vec::new();
        for (i, record) in output.records.iter().enumerate() {
            if record
                .stops
                .iter()
                .any(|check| check.depth == depth && check.fired)
            {
                let end = k_max.min(record.settings.len());
                found.push((record.settings[..end].to_vec(), i));
            }
        }
        Ok(found)
    }
}

/// Crosses one value with the level's coordinates on top of the inherited
/// settings. Multi-setting levels expect vector values.
fn apply_level(
    node: &SweepNode,
    value: &SettingValue,
    current: &[AppliedSetting],
) -> Result<Vec<AppliedSetting>, SimError> {
    let mut delta = current.to_vec();
    if let [coordinate] = node.settings.as_slice() {
        delta.push(AppliedSetting {
            coordinate: coordinate.clone(),
            value: value.clone(),
        });
        return Ok(delta);
    }

    let SettingValue::List(components) = value else {
        return Err(level_arity_error(node, value));
    };
    if components.len() < node.settings.len() {
        return Err(level_arity_error(node, value));
    }
    for (coordinate, component) in node.settings.iter().zip(components) {
        delta.push(AppliedSetting {
            coordinate: coordinate.clone(),
            value: component.clone(),
        });
    }
    Ok(delta)
}

fn level_arity_error(node: &SweepNode, value: &SettingValue) -> SimError {
    SimError::Sweep(
        ErrorInfo::new(
            "values-count",
            "a level varying several settings needs one vector component per setting",
        )
        .with_context("settings", node.settings.len().to_string())
        .with_context("value", format!("{value:?}")),
    )
}

pub(crate) fn map_missing() -> SimError {
    SimError::Sweep(ErrorInfo::new("map-missing", "no map has been set"))
}

pub(crate) fn depth_not_found(depth: usize) -> SimError {
    SimError::Search(
        ErrorInfo::new("depth-not-found", "the map has no level at this depth")
            .with_context("depth", depth.to_string()),
    )
}

pub(crate) fn stop_not_found(depth: usize) -> SimError {
    SimError::Search(
        ErrorInfo::new("stop-not-found", "this sweep level has no stop condition")
            .with_context("depth", depth.to_string()),
    )
}
