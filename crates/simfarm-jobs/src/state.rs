//! Job state and record types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};

/// Lifecycle state of one remote job.
///
/// Transitions only move forward: WAITING → RUNNING → {SUCCEED, FAILED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Queued, not yet started.
    Waiting,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeed,
    /// Finished with a failure.
    Failed,
}

impl JobState {
    /// Returns `true` for the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeed | JobState::Failed)
    }
}

impl FromStr for JobState {
    type Err = SimError;

    /// Parses a status token case-insensitively. Unknown tokens are fatal:
    /// they indicate a configuration bug, not a transient remote fault.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WAITING" => Ok(JobState::Waiting),
            "RUNNING" => Ok(JobState::Running),
            "SUCCEED" => Ok(JobState::Succeed),
            "FAILED" => Ok(JobState::Failed),
            other => Err(SimError::Jobs(
                ErrorInfo::new("unknown-job-state", "unrecognized job state token")
                    .with_context("token", other),
            )),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            JobState::Waiting => "WAITING",
            JobState::Running => "RUNNING",
            JobState::Succeed => "SUCCEED",
            JobState::Failed => "FAILED",
        };
        f.write_str(token)
    }
}

/// Snapshot of one remote job as read from the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque remote job identifier, unique within one poll snapshot.
    pub name: String,
    /// Latest known state.
    pub state: JobState,
    /// Steps completed so far; meaningful while RUNNING.
    #[serde(default)]
    pub finished_steps: u64,
    /// Total steps declared by the job; meaningful while RUNNING.
    #[serde(default)]
    pub total_steps: u64,
}

impl JobRecord {
    /// Creates a record with no progress information.
    pub fn new(name: impl Into<String>, state: JobState) -> Self {
        Self {
            name: name.into(),
            state,
            finished_steps: 0,
            total_steps: 0,
        }
    }
}
