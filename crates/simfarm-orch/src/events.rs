//! Structured progress events emitted by the orchestrator.
//!
//! The orchestrator never prints; an external observer subscribes to these
//! through the event bus and renders them however it likes.

/// Tagged progress notification for one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// The run loop started.
    RunStart,
    /// Cache extraction started for the given number of specs.
    ExtractStart {
        /// Number of simulations to extract.
        total: usize,
    },
    /// One simulation has been looked up in the cache.
    ExtractProgress,
    /// Cache extraction finished.
    ExtractEnd,
    /// Script generation and submission started.
    GenerateStart,
    /// Scripts were submitted; job identifiers were collected.
    GenerateEnd {
        /// Number of submitted jobs.
        jobs: usize,
    },
    /// The wait loop started for the given job identifiers.
    WaitStart {
        /// Identifiers of the jobs being waited on.
        jobs: Vec<String>,
    },
    /// The job state partition changed.
    WaitProgress {
        /// Jobs still waiting.
        waiting: usize,
        /// Jobs currently running.
        running: usize,
        /// Jobs finished successfully.
        succeed: usize,
        /// Jobs finished with a failure.
        failed: usize,
    },
    /// Every tracked job reached a terminal state.
    WaitEnd,
    /// Result download started.
    DownloadStart {
        /// Number of simulations to download.
        total: usize,
    },
    /// One simulation has been downloaded and handled.
    DownloadProgress,
    /// Result download finished.
    DownloadEnd,
    /// The remote scripts directory is being deleted.
    DeleteScripts,
    /// The orchestrator transitioned to the paused state.
    Paused,
    /// The orchestrator resumed from a pause.
    Resumed,
    /// The run loop ended.
    RunEnd {
        /// Number of simulations that could not be produced.
        unknown: usize,
    },
}
