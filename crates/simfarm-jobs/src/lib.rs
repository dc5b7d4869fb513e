#![deny(missing_docs)]
#![doc = "Remote job state tracking: typed job records parsed from the remote status file, with aggregate-by-state queries used to terminate the orchestrator's polling loop."]

pub mod state;
pub mod tracker;

pub use state::{JobRecord, JobState};
pub use tracker::{parse_status_line, JobTracker};
