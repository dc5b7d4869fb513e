//! Nested parameter sweeps over simulation settings.
//!
//! A sweep map declares one or more nested levels, each varying some
//! settings over a value list or an interpolated range. The
//! [`SearchEngine`] walks the map, produces the simulations of every leaf
//! combination through a [`SimulationRunner`], evaluates them through an
//! [`Evaluator`], and interrupts a level when its stop condition fires.
//! Discovered crossings can then be refined by root-finding
//! ([`SearchEngine::search`]).

#![deny(missing_docs)]

pub mod engine;
pub mod events;
pub mod map;
pub mod refine;
pub mod stop;

pub use engine::{
    AppliedSetting, EvaluationMode, EvaluationRecord, Evaluator, MapOutput, SearchEngine,
    SimulationRunner, StopCheck,
};
pub use events::SearchEvent;
pub use map::{build_values, SweepNode, ValueSpec};
pub use refine::{Bracket, SearchIteration, SearchRecord};
pub use stop::{check_stop, StopCondition};
