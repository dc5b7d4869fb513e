//! Tracks the latest known state of a named set of remote jobs.

use indexmap::IndexMap;
use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_core::RemoteChannel;

use crate::state::{JobRecord, JobState};

/// Parses the remote status file into [`JobRecord`]s and answers
/// aggregate-by-state queries.
///
/// Each update replaces whole records; the tracker never patches a record in
/// place. A job in a terminal state is never downgraded, and a job absent
/// from a later read keeps its last known state (a job may briefly disappear
/// from the status file without being treated as failed).
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: IndexMap<String, Option<JobRecord>>,
    status_file: Option<String>,
}

impl JobTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers job names to watch.
    ///
    /// Fails with `duplicate-job` on an already tracked name unless
    /// `ignore_existing` is set.
    pub fn add<I, S>(&mut self, names: I, ignore_existing: bool) -> Result<(), SimError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if self.jobs.contains_key(&name) {
                if ignore_existing {
                    continue;
                }
                return Err(SimError::Jobs(
                    ErrorInfo::new("duplicate-job", "job is already tracked")
                        .with_context("name", name),
                ));
            }
            self.jobs.insert(name, None);
        }
        Ok(())
    }

    /// Remembers which remote file to re-read state from. No I/O happens
    /// until [`update_from_file`](Self::update_from_file).
    pub fn link_to_file(&mut self, path: impl Into<String>) {
        self.status_file = Some(path.into());
    }

    /// Reads the linked status file in full and refreshes every tracked job
    /// mentioned in it. Lines for untracked names are ignored.
    pub fn update_from_file(&mut self, channel: &mut dyn RemoteChannel) -> Result<(), SimError> {
        let path = self.status_file.clone().ok_or_else(|| {
            SimError::Jobs(ErrorInfo::new(
                "no-status-file",
                "the tracker is not linked to a status file",
            ))
        })?;
        let contents = channel.read_file(&path)?;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_status_line(line)?;
            if let Some(slot) = self.jobs.get_mut(&record.name) {
                let terminal = slot.as_ref().map(|r| r.state.is_terminal()).unwrap_or(false);
                if !terminal {
                    *slot = Some(record);
                }
            }
        }
        Ok(())
    }

    /// Returns the tracked jobs currently in one of the given states.
    pub fn jobs_with_states(&self, states: &[JobState]) -> Vec<JobRecord> {
        self.jobs
            .values()
            .flatten()
            .filter(|record| states.contains(&record.state))
            .cloned()
            .collect()
    }

    /// Returns every tracked job name, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    /// Returns `true` once every tracked job has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        !self.jobs.is_empty()
            && self.jobs.values().all(|slot| {
                slot.as_ref()
                    .map(|record| record.state.is_terminal())
                    .unwrap_or(false)
            })
    }

    /// Drops all tracked names and the file link.
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.status_file = None;
    }
}

/// Parses one status line: `name<TAB>state[<TAB>finished/total]`.
pub fn parse_status_line(line: &str) -> Result<JobRecord, SimError> {
    let mut fields = line.split('\t');
    let name = fields.next().unwrap_or_default().trim();
    let state_token = fields.next().map(str::trim).filter(|s| !s.is_empty());

    let state_token = state_token.ok_or_else(|| {
        SimError::Jobs(
            ErrorInfo::new("job-state-missing", "status line has no state field")
                .with_context("line", line),
        )
    })?;
    let state: JobState = state_token.parse()?;

    let mut record = JobRecord::new(name, state);
    if let Some(progress) = fields.next().map(str::trim).filter(|s| !s.is_empty()) {
        let (finished, total) = progress.split_once('/').ok_or_else(|| {
            SimError::Jobs(
                ErrorInfo::new("job-progress", "progress field is not finished/total")
                    .with_context("line", line),
            )
        })?;
        let parse = |s: &str| {
            s.trim().parse::<u64>().map_err(|_| {
                SimError::Jobs(
                    ErrorInfo::new("job-progress", "progress counters must be integers")
                        .with_context("line", line),
                )
            })
        };
        record.finished_steps = parse(finished)?;
        record.total_steps = parse(total)?;
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_counters() {
        let record = parse_status_line("job_1\tRUNNING\t3/10").unwrap();
        assert_eq!(record.state, JobState::Running);
        assert_eq!(record.finished_steps, 3);
        assert_eq!(record.total_steps, 10);
    }

    #[test]
    fn state_tokens_are_case_insensitive() {
        let record = parse_status_line("job_1\tsucceed").unwrap();
        assert_eq!(record.state, JobState::Succeed);
    }

    #[test]
    fn missing_state_is_an_error() {
        let err = parse_status_line("job_1").unwrap_err();
        assert_eq!(err.code(), "job-state-missing");
    }

    #[test]
    fn unknown_state_is_fatal() {
        let err = parse_status_line("job_1\tEXPLODED").unwrap_err();
        assert_eq!(err.code(), "unknown-job-state");
    }
}
