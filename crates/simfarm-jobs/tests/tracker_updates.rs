use std::path::Path;

use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_core::RemoteChannel;
use simfarm_jobs::{JobState, JobTracker};

/// Channel returning a scripted sequence of status-file contents.
struct ScriptedChannel {
    reads: Vec<String>,
    cursor: usize,
}

impl ScriptedChannel {
    fn new(reads: &[&str]) -> Self {
        Self {
            reads: reads.iter().map(|s| s.to_string()).collect(),
            cursor: 0,
        }
    }
}

impl RemoteChannel for ScriptedChannel {
    fn send_dir(&mut self, _: &Path, remote: &str, _: bool) -> Result<String, SimError> {
        Ok(remote.to_string())
    }

    fn receive_dir(&mut self, _: &str, _: &Path, _: bool) -> Result<(), SimError> {
        Ok(())
    }

    fn execute(&mut self, _: &str) -> Result<Vec<String>, SimError> {
        Ok(Vec::new())
    }

    fn delete_remote(&mut self, _: &[String]) -> Result<(), SimError> {
        Ok(())
    }

    fn read_file(&mut self, _: &str) -> Result<String, SimError> {
        let contents = self
            .reads
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| SimError::Remote(ErrorInfo::new("read", "no more scripted reads")))?;
        self.cursor = (self.cursor + 1).min(self.reads.len() - 1);
        Ok(contents)
    }
}

fn tracker_for(names: &[&str]) -> JobTracker {
    let mut tracker = JobTracker::new();
    tracker.add(names.iter().copied(), false).unwrap();
    tracker.link_to_file("jobs.txt");
    tracker
}

#[test]
fn duplicate_names_are_rejected_unless_ignored() {
    let mut tracker = JobTracker::new();
    tracker.add(["a", "b"], false).unwrap();
    let err = tracker.add(["b"], false).unwrap_err();
    assert_eq!(err.code(), "duplicate-job");
    tracker.add(["b", "c"], true).unwrap();
    assert_eq!(tracker.names(), vec!["a", "b", "c"]);
}

#[test]
fn update_replaces_whole_records() {
    let mut channel = ScriptedChannel::new(&[
        "a\tWAITING\nb\tWAITING",
        "a\tRUNNING\t2/8\nb\tRUNNING\t1/8",
    ]);
    let mut tracker = tracker_for(&["a", "b"]);

    tracker.update_from_file(&mut channel).unwrap();
    assert_eq!(tracker.jobs_with_states(&[JobState::Waiting]).len(), 2);

    tracker.update_from_file(&mut channel).unwrap();
    let running = tracker.jobs_with_states(&[JobState::Running]);
    assert_eq!(running.len(), 2);
    assert_eq!(running[0].finished_steps, 2);
    assert_eq!(running[0].total_steps, 8);
}

#[test]
fn terminal_states_are_never_left() {
    let mut channel = ScriptedChannel::new(&[
        "a\tSUCCEED\nb\tFAILED",
        "a\tRUNNING\t1/2\nb\tWAITING",
    ]);
    let mut tracker = tracker_for(&["a", "b"]);

    tracker.update_from_file(&mut channel).unwrap();
    tracker.update_from_file(&mut channel).unwrap();

    assert_eq!(tracker.jobs_with_states(&[JobState::Succeed]).len(), 1);
    assert_eq!(tracker.jobs_with_states(&[JobState::Failed]).len(), 1);
    assert!(tracker.jobs_with_states(&[JobState::Running, JobState::Waiting]).is_empty());
    assert!(tracker.all_terminal());
}

#[test]
fn missing_jobs_keep_their_last_state() {
    let mut channel = ScriptedChannel::new(&["a\tRUNNING\t1/4\nb\tSUCCEED", "b\tSUCCEED"]);
    let mut tracker = tracker_for(&["a", "b"]);

    tracker.update_from_file(&mut channel).unwrap();
    tracker.update_from_file(&mut channel).unwrap();

    let running = tracker.jobs_with_states(&[JobState::Running]);
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].name, "a");
    assert!(!tracker.all_terminal());
}

#[test]
fn untracked_lines_are_ignored() {
    let mut channel = ScriptedChannel::new(&["a\tRUNNING\t1/4\nintruder\tFAILED"]);
    let mut tracker = tracker_for(&["a"]);

    tracker.update_from_file(&mut channel).unwrap();
    assert!(tracker.jobs_with_states(&[JobState::Failed]).is_empty());
    assert_eq!(tracker.names(), vec!["a"]);
}

#[test]
fn unknown_state_token_propagates() {
    let mut channel = ScriptedChannel::new(&["a\tLOST"]);
    let mut tracker = tracker_for(&["a"]);

    let err = tracker.update_from_file(&mut channel).unwrap_err();
    assert_eq!(err.code(), "unknown-job-state");
}

#[test]
fn clear_drops_names_and_link() {
    let mut channel = ScriptedChannel::new(&["a\tSUCCEED"]);
    let mut tracker = tracker_for(&["a"]);
    tracker.update_from_file(&mut channel).unwrap();

    tracker.clear();
    assert!(tracker.names().is_empty());
    assert!(!tracker.all_terminal());
    let err = tracker.update_from_file(&mut channel).unwrap_err();
    assert_eq!(err.code(), "no-status-file");
}
