//! Structured progress events emitted while following a map or refining a
//! stop crossing.

/// Tagged progress notification for one sweep or search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// A stop condition fired.
    Stopped,
    /// A map walk started.
    MapStart,
    /// A map walk finished.
    MapEnd,
    /// A sweep level started iterating its values.
    ComponentStart {
        /// Depth of the level.
        depth: usize,
        /// Number of value combinations at this level.
        count: usize,
    },
    /// One value combination of a level was handled.
    ComponentProgress {
        /// Depth of the level.
        depth: usize,
    },
    /// A sweep level finished.
    ComponentEnd {
        /// Depth of the level.
        depth: usize,
    },
    /// Refinement started for the given number of stop-triggering prefixes.
    SearchesStart {
        /// Number of independent searches.
        count: usize,
    },
    /// Refinement started for one prefix.
    SearchStart,
    /// One refinement iteration finished.
    SearchIteration {
        /// Iteration number, starting at 1.
        iteration: usize,
        /// Stopping criterion after the iteration.
        criterion: f64,
    },
    /// Refinement finished for one prefix.
    SearchEnd,
    /// All refinements finished.
    SearchesEnd,
}
