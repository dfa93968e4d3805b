//! Execution unit: one snippet, one isolated environment.
//!
//! Every call provisions a fresh environment, runs the program under a
//! hard deadline and always tears the environment down again, whatever
//! happened in between. Failures are reported as data in the returned
//! [`ExecutionOutcome`], never as `Err`.

mod workspace;

pub use workspace::Workspace;

use anyhow::Result;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::registry::{LifecycleRegistry, SandboxState};
use crate::sandbox::{IsolationBackend, ResourceLimits, RunOutput, SandboxError, SandboxId};
use crate::types::{ExecutionOutcome, ExecutionRequest, EXECUTION_UNAVAILABLE};

/// How long past the execution timeout the executor keeps waiting on a
/// backend that does not enforce the timeout itself.
const DEFAULT_WAIT_GRACE: Duration = Duration::from_secs(2);

/// Process-wide execution parameters, frozen at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    /// Limits applied to every environment.
    pub limits: ResourceLimits,
    /// Default execution timeout.
    pub timeout: Duration,
    /// Registry TTL of every environment.
    pub ttl: Duration,
    /// Extra wait on top of the timeout before giving up on the backend.
    pub wait_grace: Duration,
    /// Maximum concurrent executions; 0 is unbounded.
    pub max_concurrent: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            timeout: Duration::from_secs(30),
            ttl: Duration::from_secs(300),
            wait_grace: DEFAULT_WAIT_GRACE,
            max_concurrent: 0,
        }
    }
}

impl ExecutionSettings {
    /// Validate and freeze the relevant parts of `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let limits = ResourceLimits::from_config(&config.resources)?;

        if config.resources.timeout_secs == 0 {
            anyhow::bail!("resources.timeout_secs must be positive");
        }
        if config.lifecycle.ttl_secs <= config.resources.timeout_secs {
            anyhow::bail!(
                "lifecycle.ttl_secs ({}) must exceed resources.timeout_secs ({})",
                config.lifecycle.ttl_secs,
                config.resources.timeout_secs
            );
        }

        Ok(Self {
            limits,
            timeout: Duration::from_secs(config.resources.timeout_secs),
            ttl: Duration::from_secs(config.lifecycle.ttl_secs),
            wait_grace: DEFAULT_WAIT_GRACE,
            max_concurrent: config.lifecycle.max_concurrent,
        })
    }
}

/// Runs programs in isolated environments.
pub struct Executor {
    backend: Arc<dyn IsolationBackend>,
    registry: Arc<LifecycleRegistry>,
    settings: ExecutionSettings,
    slots: Option<Arc<Semaphore>>,
}

impl Executor {
    /// Create an executor sharing `registry` with the reaper.
    pub fn new(
        backend: Arc<dyn IsolationBackend>,
        registry: Arc<LifecycleRegistry>,
        settings: ExecutionSettings,
    ) -> Self {
        let slots = (settings.max_concurrent > 0)
            .then(|| Arc::new(Semaphore::new(settings.max_concurrent)));
        Self {
            backend,
            registry,
            settings,
            slots,
        }
    }

    /// Frozen settings.
    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Run one request to completion.
    ///
    /// The environment is destroyed and unregistered on every path,
    /// including a panic inside the backend. A caller that drops the
    /// returned future mid-run leaves the environment to the reaper.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        if !self.backend.is_available() {
            debug!("Isolation backend disabled, not executing");
            return ExecutionOutcome::unavailable();
        }

        let _permit = match &self.slots {
            Some(slots) => Arc::clone(slots).acquire_owned().await.ok(),
            None => None,
        };

        let started = Instant::now();
        let timeout = match request.timeout() {
            Some(timeout) if timeout.is_zero() || timeout >= self.settings.ttl => {
                warn!(?timeout, ttl = ?self.settings.ttl, "Rejected request timeout");
                return ExecutionOutcome::failed(
                    format!(
                        "Invalid timeout: {timeout:?} must be positive and shorter than the sandbox TTL ({:?})",
                        self.settings.ttl
                    ),
                    None,
                    started.elapsed(),
                );
            }
            Some(timeout) => timeout,
            None => self.settings.timeout,
        };

        let workspace = match Workspace::create(request.code(), request.input()) {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Failed to prepare workspace: {e:#}");
                return ExecutionOutcome::failed(
                    format!("Runtime fault: {e:#}"),
                    None,
                    started.elapsed(),
                );
            }
        };

        let id = match self
            .backend
            .provision(&self.settings.limits, workspace.path())
            .await
        {
            Ok(id) => id,
            Err(e) if e.is_unavailable() => {
                warn!("{e}");
                return ExecutionOutcome::failed(EXECUTION_UNAVAILABLE, None, started.elapsed());
            }
            Err(e) => {
                warn!(category = e.category(), "Provisioning failed: {e}");
                return ExecutionOutcome::failed(e.to_string(), None, started.elapsed());
            }
        };

        self.registry.register(id.clone(), self.settings.ttl);
        debug!(sandbox = %id.short(), ?timeout, "Sandbox provisioned");

        let outcome = AssertUnwindSafe(self.drive(&id, timeout, started))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(sandbox = %id.short(), "Execution panicked");
                self.registry.transition(&id, SandboxState::Faulted);
                ExecutionOutcome::failed(
                    SandboxError::runtime_fault("execution panicked").to_string(),
                    None,
                    started.elapsed(),
                )
            });

        self.release(&id).await;
        drop(workspace);
        outcome
    }

    /// Start the environment and classify how it ended.
    async fn drive(&self, id: &SandboxId, timeout: Duration, started: Instant) -> ExecutionOutcome {
        self.registry.transition(id, SandboxState::Running);

        // The backend enforces `timeout`; the outer deadline only catches
        // a backend that fails to.
        let deadline = timeout + self.settings.wait_grace;
        let result = tokio::time::timeout(deadline, self.backend.run(id, timeout))
            .await
            .unwrap_or_else(|_| Err(SandboxError::timeout(timeout)));
        let elapsed = started.elapsed();

        match result {
            Ok(run) => {
                self.registry.transition(id, SandboxState::Completed);
                info!(
                    sandbox = %id.short(),
                    exit_code = run.exit_code,
                    ?elapsed,
                    "Execution finished"
                );
                if run.exit_code == 0 {
                    ExecutionOutcome::succeeded(run.output, elapsed)
                } else {
                    ExecutionOutcome::failed(describe_exit(&run), Some(run.output), elapsed)
                }
            }
            Err(e) => {
                let state = if e.is_timeout() {
                    SandboxState::TimedOut
                } else {
                    SandboxState::Faulted
                };
                self.registry.transition(id, state);
                warn!(sandbox = %id.short(), category = e.category(), "{e}");

                let output = self.partial_output(id).await;
                ExecutionOutcome::failed(e.to_string(), output, elapsed)
            }
        }
    }

    /// Whatever the environment printed before it was cut off, if the
    /// backend can still tell.
    async fn partial_output(&self, id: &SandboxId) -> Option<String> {
        match tokio::time::timeout(self.settings.wait_grace, self.backend.fetch_output(id)).await {
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                debug!(sandbox = %id.short(), "No partial output: {e}");
                None
            }
            Err(_) => {
                debug!(sandbox = %id.short(), "Timed out fetching partial output");
                None
            }
        }
    }

    /// Destroy and unregister. Failures are logged, never returned.
    async fn release(&self, id: &SandboxId) {
        self.registry.transition(id, SandboxState::Destroyed);
        if let Err(e) = self.backend.destroy(id).await {
            warn!(
                event = "cleanup_failure",
                sandbox = %id.short(),
                category = e.category(),
                "{e}"
            );
        }
        self.registry.unregister(id);
    }
}

fn describe_exit(run: &RunOutput) -> String {
    if run.oom_killed {
        format!(
            "Process exited with code {} (memory limit exceeded)",
            run.exit_code
        )
    } else {
        format!("Process exited with code {}", run.exit_code)
    }
}
