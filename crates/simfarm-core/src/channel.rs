//! Remote transport seam.
//!
//! The actual transport (SSH/SFTP, a local fake in tests) lives outside this
//! workspace; the orchestrator and job tracker only depend on this trait.

use std::path::Path;

use crate::errors::SimError;

/// Error code a channel must use when a remote path does not exist.
///
/// The orchestrator treats a [`receive_dir`](RemoteChannel::receive_dir)
/// failure with this code as a permanently lost job rather than a fault.
pub const REMOTE_PATH_MISSING: &str = "remote-path-missing";

/// File transfer and command execution against the remote host.
pub trait RemoteChannel {
    /// Uploads a local directory, returning the resolved remote path.
    fn send_dir(
        &mut self,
        local: &Path,
        remote: &str,
        empty_dest: bool,
    ) -> Result<String, SimError>;

    /// Downloads a remote directory into a local destination.
    ///
    /// With `delete` set, the remote copy is removed after the transfer.
    /// A missing remote path must fail with [`REMOTE_PATH_MISSING`].
    fn receive_dir(&mut self, remote: &str, local: &Path, delete: bool) -> Result<(), SimError>;

    /// Executes a command remotely and returns its stdout, one line per entry.
    fn execute(&mut self, command: &str) -> Result<Vec<String>, SimError>;

    /// Deletes remote files or directories. Missing paths are not an error.
    fn delete_remote(&mut self, paths: &[String]) -> Result<(), SimError>;

    /// Reads a remote text file in full.
    fn read_file(&mut self, path: &str) -> Result<String, SimError>;
}

impl SimError {
    /// Returns `true` when the error marks a missing remote path.
    pub fn is_remote_path_missing(&self) -> bool {
        matches!(self, SimError::Remote(info) if info.code == REMOTE_PATH_MISSING)
    }
}
