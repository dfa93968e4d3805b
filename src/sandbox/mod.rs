//! Isolation primitive client.
//!
//! Thin adapter over an external container service. The engine only
//! talks to the [`IsolationBackend`] trait; [`DockerBackend`] is the
//! production implementation. Unit tests use a scripted in-crate mock.

mod docker;
mod error;
mod limits;
#[cfg(test)]
mod mock;
mod network;

pub use docker::DockerBackend;
pub use error::SandboxError;
pub use limits::{parse_memory_limit, ResourceLimits};
#[cfg(test)]
pub(crate) use mock::{MockBackend, MockRun};
pub use network::{MountMode, NetworkMode};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Where the per-execution workspace is mounted inside the environment.
pub const WORKSPACE_MOUNT: &str = "/code";

/// Program file name inside the workspace.
pub const PROGRAM_FILE: &str = "main.py";

/// File whose contents are redirected to the program's stdin.
pub const STDIN_FILE: &str = "stdin.txt";

/// Label attached to every environment this crate creates.
pub const MANAGED_LABEL: &str = "coderun.managed";

/// Opaque identifier of a live isolated environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SandboxId(String);

impl SandboxId {
    /// Wraps a backend-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a finished program left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Process exit status.
    pub exit_code: i64,
    /// Interleaved stdout and stderr.
    pub output: String,
    /// The kernel killed the program for exceeding its memory ceiling.
    pub oom_killed: bool,
}

/// Client for an external process/filesystem/network isolation service.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Returns the backend name for display.
    fn name(&self) -> &'static str;

    /// False once the backend has been found unreachable at startup.
    ///
    /// A disabled backend fails every `provision` with
    /// [`SandboxError::Unavailable`] without contacting the service.
    fn is_available(&self) -> bool;

    /// Creates (but does not start) an environment with `workspace`
    /// mounted at [`WORKSPACE_MOUNT`].
    async fn provision(
        &self,
        limits: &ResourceLimits,
        workspace: &Path,
    ) -> Result<SandboxId, SandboxError>;

    /// Starts the environment and waits at most `timeout` for it to exit.
    async fn run(&self, id: &SandboxId, timeout: Duration) -> Result<RunOutput, SandboxError>;

    /// Best-effort retrieval of whatever output the environment produced.
    async fn fetch_output(&self, id: &SandboxId) -> Result<String, SandboxError>;

    /// Stops and removes the environment.
    ///
    /// Destroying an environment that no longer exists succeeds.
    async fn destroy(&self, id: &SandboxId) -> Result<(), SandboxError>;

    /// Lists environments carrying [`MANAGED_LABEL`], live or not.
    async fn list_managed(&self) -> Result<Vec<SandboxId>, SandboxError>;

    /// Destroys every managed environment left behind by earlier processes.
    ///
    /// Returns the number of environments removed.
    async fn cleanup_orphaned(&self) -> Result<u32, SandboxError> {
        let mut removed = 0;
        for id in self.list_managed().await? {
            match self.destroy(&id).await {
                Ok(()) => {
                    info!(sandbox = %id.short(), "Removed orphaned sandbox");
                    removed += 1;
                }
                Err(e) => {
                    warn!(sandbox = %id.short(), category = e.category(), "{e}");
                }
            }
        }
        Ok(removed)
    }
}
