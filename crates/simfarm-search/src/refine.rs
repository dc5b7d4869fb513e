//! Root-finding refinement of discovered stop crossings.
//!
//! Once a walk records a stop at some depth, the crossing lies between the
//! value that fired it and the one before. Each stop-triggering settings
//! prefix seeds one bracketed search, iterated by the secant method for
//! numeric targets and by bisection otherwise.

use serde::{Deserialize, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_sim::SettingValue;

use crate::engine::{
    depth_not_found, map_missing, stop_not_found, AppliedSetting, EvaluationMode,
    EvaluationRecord, Evaluator, MapOutput, SearchEngine, SimulationRunner,
};
use crate::events::SearchEvent;
use crate::map::ValueSpec;
use crate::stop::check_stop;

/// Interval known to contain the crossing, with the evaluations at its
/// bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    /// Lower and upper bound of the varying setting.
    pub bounds: (f64, f64),
    /// Evaluation results at the bounds.
    pub evaluations: (f64, f64),
}

/// One iteration of the refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIteration {
    /// Bracket the iterate was derived from.
    pub interval: Bracket,
    /// New candidate value of the varying setting.
    pub iterate: f64,
    /// Evaluation at the iterate.
    pub evaluation: f64,
    /// Convergence measure after this iteration.
    pub stopping_criterion: f64,
}

/// Full refinement history for one stop-triggering settings prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Settings of the shallower levels, pinned during the search.
    pub previous_settings: Vec<AppliedSetting>,
    /// Initial bracket seeded from the walk output.
    pub interval: Bracket,
    /// Iterations, in order.
    pub iterations: Vec<SearchIteration>,
}

impl<R, E> SearchEngine<R, E>
where
    R: SimulationRunner,
    E: Evaluator,
{
    /// Refines the stop crossing at the given depth for every settings
    /// prefix that fired it, then restores the map declaration and the
    /// original walk output.
    ///
    /// The level must vary exactly one setting; its declared values define
    /// the search interval. Walks the map first if it has not been walked.
    pub fn search(&mut self, depth: usize) -> Result<&[SearchRecord], SimError> {
        let declared_map = self.map.clone().ok_or_else(map_missing)?;
        let (stop, level_settings) = {
            let levels = declared_map.depths();
            let level = levels.get(depth).ok_or_else(|| depth_not_found(depth))?;
            let stop = level.stop.clone().ok_or_else(|| stop_not_found(depth))?;
            let lens: Vec<usize> = levels.iter().map(|l| l.settings.len()).collect();
            (stop, lens)
        };

        if self.output.is_none() {
            self.follow_map()?;
        }

        // A stop at index 0 has nothing before it to bracket with.
        let stops: Vec<_> = self
            .find_stops(depth)?
            .into_iter()
            .filter(|(_, k)| *k > 0)
            .collect();
        if stops.is_empty() {
            return Err(no_solution());
        }

        self.events.emit(&SearchEvent::SearchesStart { count: stops.len() });
        self.searches.clear();

        let initial_records = self
            .output
            .as_ref()
            .map(|output| output.records.clone())
            .unwrap_or_default();
        let value_index = stops[0].0.len() - 1;

        for (stopped, k) in &stops {
            self.events.emit(&SearchEvent::SearchStart);

            let interval = Bracket {
                bounds: (
                    bound_value(&initial_records[k - 1], self.mode, value_index)?,
                    bound_value(&initial_records[*k], self.mode, value_index)?,
                ),
                evaluations: (
                    initial_records[k - 1].evaluation,
                    initial_records[*k].evaluation,
                ),
            };
            let mut record = SearchRecord {
                previous_settings: stopped[..value_index].to_vec(),
                interval,
                iterations: Vec::new(),
            };

            // Pin the shallower levels to the prefix that produced this stop.
            let mut offset = 0;
            for (d, len) in level_settings.iter().take(depth).copied().enumerate() {
                let values: Vec<SettingValue> = stopped[offset..offset + len]
                    .iter()
                    .map(|applied| applied.value.clone())
                    .collect();
                let values = if values.len() == 1 {
                    values
                } else {
                    vec![SettingValue::List(values)]
                };
                if let Some(node) = self.map.as_mut().and_then(|map| map.level_mut(d)) {
                    node.values = ValueSpec::List(values);
                }
                offset += len;
            }

            loop {
                let current = match record.iterations.last() {
                    Some(latest) => {
                        // The bracket keeps the crossing between its bounds:
                        // the iterate replaces whichever bound keeps the stop
                        // condition holding across the interval.
                        let held = check_stop(
                            &stop,
                            &[latest.interval.evaluations.0, latest.evaluation],
                        )?;
                        if held {
                            Bracket {
                                bounds: (latest.interval.bounds.0, latest.iterate),
                                evaluations: (latest.interval.evaluations.0, latest.evaluation),
                            }
                        } else {
                            Bracket {
                                bounds: (latest.iterate, latest.interval.bounds.1),
                                evaluations: (latest.evaluation, latest.interval.evaluations.1),
                            }
                        }
                    }
                    None => record.interval,
                };

                let iterate = match stop.target() {
                    Some(target) => {
                        let (x0, x1) = current.bounds;
                        let (y0, y1) = current.evaluations;
                        x0 + (target - y0) * (x0 - x1) / (y0 - y1)
                    }
                    None => 0.5 * (current.bounds.0 + current.bounds.1),
                };

                if let Some(node) = self.map.as_mut().and_then(|map| map.level_mut(depth)) {
                    node.values = ValueSpec::List(vec![SettingValue::Number(iterate)]);
                }
                self.follow_map()?;

                let evaluation = self
                    .output
                    .as_ref()
                    .and_then(|output| output.records.last())
                    .map(|last| last.evaluation)
                    .ok_or_else(no_solution)?;

                let stopping_criterion = match stop.target() {
                    Some(target) => (evaluation - target).abs(),
                    None => match record.iterations.last() {
                        Some(previous) => (iterate - previous.iterate).abs(),
                        None => (record.interval.bounds.1 - record.interval.bounds.0).abs(),
                    },
                };

                record.iterations.push(SearchIteration {
                    interval: current,
                    iterate,
                    evaluation,
                    stopping_criterion,
                });
                self.events.emit(&SearchEvent::SearchIteration {
                    iteration: record.iterations.len(),
                    criterion: stopping_criterion,
                });

                if stopping_criterion < self.tolerance || record.iterations.len() > self.itermax {
                    break;
                }
            }

            self.searches.push(record);
            self.events.emit(&SearchEvent::SearchEnd);
        }

        let restored = MapOutput {
            map: declared_map.clone(),
            records: initial_records,
        };
        self.map = Some(declared_map);
        self.output = Some(restored);

        self.events.emit(&SearchEvent::SearchesEnd);
        Ok(&self.searches)
    }
}

/// Value of the depth-level setting in one record, as a number.
fn bound_value(
    record: &EvaluationRecord,
    mode: EvaluationMode,
    index: usize,
) -> Result<f64, SimError> {
    let settings = match mode {
        EvaluationMode::Each => &record.settings,
        EvaluationMode::Group => record
            .group_settings
            .as_ref()
            .and_then(|group| group.last())
            .unwrap_or(&record.settings),
    };
    let applied = settings.get(index).ok_or_else(no_solution)?;
    applied.value.as_number()?.ok_or_else(|| {
        SimError::Search(
            ErrorInfo::new("bracket-bound", "the varying setting value is not numeric")
                .with_context("value", format!("{:?}", applied.value)),
        )
    })
}

fn no_solution() -> SimError {
    SimError::Search(ErrorInfo::new(
        "no-solution",
        "no stop was verified with the declared values",
    ))
}
