//! Scripted isolation backend.
//!
//! Returns predetermined results and records every call so tests can
//! exercise the executor, suite runner and reaper without Docker.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{IsolationBackend, ResourceLimits, RunOutput, SandboxError, SandboxId, PROGRAM_FILE};

/// What a scripted run does.
#[derive(Debug, Clone)]
pub enum MockRun {
    /// Exit with the given status and output.
    Exit {
        /// Exit status.
        code: i64,
        /// Combined output.
        output: String,
    },
    /// Sleep, then exit 0 with `output`; times out if `duration` exceeds the timeout.
    Sleep {
        /// Simulated run time.
        duration: Duration,
        /// Output on completion or partial output on timeout.
        output: String,
    },
    /// Fail with a runtime fault.
    Fault(String),
    /// Never return, ignoring the timeout.
    Hang,
    /// Panic inside `run`.
    Panic,
    /// Fail at provision time.
    ProvisionFails(String),
}

impl MockRun {
    /// Shorthand for [`MockRun::Exit`].
    pub fn exit(code: i64, output: &str) -> Self {
        Self::Exit {
            code,
            output: output.to_string(),
        }
    }
}

/// A scripted backend that tracks the environments it hands out.
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Results handed out in provision order. Cycles when exhausted.
    script: Arc<Vec<MockRun>>,
    available: bool,
    provisions: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
    fail_destroy: Arc<AtomicBool>,
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    scheduled: HashMap<SandboxId, MockRun>,
    live: HashSet<SandboxId>,
    destroyed: Vec<SandboxId>,
    programs: Vec<String>,
    partial: HashMap<SandboxId, String>,
}

impl MockBackend {
    /// Create a backend that hands out `script` entries in order.
    pub fn new(script: Vec<MockRun>) -> Self {
        assert!(!script.is_empty(), "mock script must not be empty");
        Self {
            script: Arc::new(script),
            available: true,
            provisions: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
            fail_destroy: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a backend that always behaves the same way.
    pub fn always(run: MockRun) -> Self {
        Self::new(vec![run])
    }

    /// Create a backend in the disabled state.
    pub fn disabled() -> Self {
        Self {
            available: false,
            ..Self::always(MockRun::exit(0, ""))
        }
    }

    /// Make every subsequent `destroy` call fail.
    pub fn set_fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Number of `provision` calls, including failed ones.
    pub fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    /// Number of `run` calls.
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Environments provisioned and not yet destroyed.
    pub fn live(&self) -> Vec<SandboxId> {
        let mut live: Vec<_> = self.lock().live.iter().cloned().collect();
        live.sort();
        live
    }

    /// Every successful `destroy` call, in order, including repeats.
    pub fn destroyed(&self) -> Vec<SandboxId> {
        self.lock().destroyed.clone()
    }

    /// Program text found in each provisioned workspace.
    pub fn programs(&self) -> Vec<String> {
        self.lock().programs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl IsolationBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn provision(
        &self,
        _limits: &ResourceLimits,
        workspace: &Path,
    ) -> Result<SandboxId, SandboxError> {
        let count = self.provisions.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(SandboxError::unavailable("mock backend disabled"));
        }

        let run = self.script[count % self.script.len()].clone();
        if let MockRun::ProvisionFails(message) = run {
            return Err(SandboxError::container_failed(message));
        }

        let program = std::fs::read_to_string(workspace.join(PROGRAM_FILE)).unwrap_or_default();
        let id = SandboxId::new(format!("mock-{count}"));

        let mut state = self.lock();
        state.programs.push(program);
        state.live.insert(id.clone());
        state.scheduled.insert(id.clone(), run);
        Ok(id)
    }

    async fn run(&self, id: &SandboxId, timeout: Duration) -> Result<RunOutput, SandboxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let run = self
            .lock()
            .scheduled
            .remove(id)
            .ok_or_else(|| SandboxError::runtime_fault(format!("no such sandbox: {id}")))?;

        match run {
            MockRun::Exit { code, output } => Ok(RunOutput {
                exit_code: code,
                output,
                oom_killed: code == 137,
            }),
            MockRun::Sleep { duration, output } => {
                if duration > timeout {
                    tokio::time::sleep(timeout).await;
                    self.lock().partial.insert(id.clone(), output);
                    Err(SandboxError::timeout(timeout))
                } else {
                    tokio::time::sleep(duration).await;
                    Ok(RunOutput {
                        exit_code: 0,
                        output,
                        oom_killed: false,
                    })
                }
            }
            MockRun::Fault(message) => Err(SandboxError::runtime_fault(message)),
            MockRun::Hang => std::future::pending().await,
            MockRun::Panic => panic!("mock backend panicked during run"),
            MockRun::ProvisionFails(_) => unreachable!("never scheduled"),
        }
    }

    async fn fetch_output(&self, id: &SandboxId) -> Result<String, SandboxError> {
        self.lock()
            .partial
            .get(id)
            .cloned()
            .ok_or_else(|| SandboxError::runtime_fault("no output available"))
    }

    async fn destroy(&self, id: &SandboxId) -> Result<(), SandboxError> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(SandboxError::destroy_failed(id.as_str(), "mock destroy failure"));
        }
        let mut state = self.lock();
        state.live.remove(id);
        state.scheduled.remove(id);
        state.destroyed.push(id.clone());
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<SandboxId>, SandboxError> {
        Ok(self.live())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with(program: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROGRAM_FILE), program).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_mock_cycles_script() {
        let backend = MockBackend::new(vec![MockRun::exit(0, "first"), MockRun::exit(1, "second")]);
        let dir = workspace_with("print(1)");
        let limits = ResourceLimits::default();

        let mut outputs = Vec::new();
        for _ in 0..3 {
            let id = backend.provision(&limits, dir.path()).await.unwrap();
            outputs.push(backend.run(&id, Duration::from_secs(1)).await.unwrap().output);
        }

        assert_eq!(outputs, ["first", "second", "first"]);
        assert_eq!(backend.provision_count(), 3);
        assert_eq!(backend.run_count(), 3);
        assert_eq!(backend.programs(), vec!["print(1)"; 3]);
    }

    #[tokio::test]
    async fn test_mock_destroy_is_idempotent() {
        let backend = MockBackend::always(MockRun::exit(0, ""));
        let dir = workspace_with("");
        let id = backend
            .provision(&ResourceLimits::default(), dir.path())
            .await
            .unwrap();

        assert!(backend.destroy(&id).await.is_ok());
        assert!(backend.destroy(&id).await.is_ok());
        assert!(backend.live().is_empty());
        assert_eq!(backend.destroyed().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_sleep_times_out_with_partial_output() {
        let backend = MockBackend::always(MockRun::Sleep {
            duration: Duration::from_secs(10),
            output: "partial".to_string(),
        });
        let dir = workspace_with("");
        let id = backend
            .provision(&ResourceLimits::default(), dir.path())
            .await
            .unwrap();

        let err = backend
            .run(&id, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(backend.fetch_output(&id).await.unwrap(), "partial");
    }

    #[tokio::test]
    async fn test_mock_disabled_rejects_provision() {
        let backend = MockBackend::disabled();
        let dir = workspace_with("");
        let err = backend
            .provision(&ResourceLimits::default(), dir.path())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_mock_backend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockBackend>();
    }
}
