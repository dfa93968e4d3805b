//! Engine facade.
//!
//! Owns the registry, the reaper task, the executor and the suite runner
//! for the lifetime of the process.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::executor::{ExecutionSettings, Executor};
use crate::harness::HarnessGenerator;
use crate::reaper::Reaper;
use crate::registry::LifecycleRegistry;
use crate::runner::SuiteRunner;
use crate::sandbox::{DockerBackend, IsolationBackend};
use crate::types::{ExecutionOutcome, ExecutionRequest, SuiteResult, TestCase};

/// A running execution engine.
pub struct Engine {
    backend: Arc<dyn IsolationBackend>,
    registry: Arc<LifecycleRegistry>,
    executor: Arc<Executor>,
    runner: SuiteRunner,
    reaper: Arc<Reaper>,
    reaper_task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Engine {
    /// Connect to Docker and start the engine.
    ///
    /// An unreachable daemon is not an error: the engine starts with a
    /// disabled backend and reports every execution as unavailable.
    pub async fn start(config: &Config) -> Result<Self> {
        let backend = DockerBackend::connect(&config.sandbox).await?;
        Self::with_backend(Arc::new(backend), config)
    }

    /// Start the engine on an existing backend.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_backend(backend: Arc<dyn IsolationBackend>, config: &Config) -> Result<Self> {
        let settings = ExecutionSettings::from_config(config)?;
        let harness = HarnessGenerator::new(config.harness.entry_point.as_str())?;
        if config.lifecycle.sweep_interval_secs == 0 {
            anyhow::bail!("lifecycle.sweep_interval_secs must be positive");
        }
        let sweep_interval = Duration::from_secs(config.lifecycle.sweep_interval_secs);

        Ok(Self::assemble(backend, settings, harness, sweep_interval))
    }

    /// Start the engine from already-validated parts.
    pub fn assemble(
        backend: Arc<dyn IsolationBackend>,
        settings: ExecutionSettings,
        harness: HarnessGenerator,
        sweep_interval: Duration,
    ) -> Self {
        if !backend.is_available() {
            warn!(
                backend = backend.name(),
                "Isolation backend unavailable; executions will be rejected"
            );
        }

        let registry = Arc::new(LifecycleRegistry::new());
        let executor = Arc::new(Executor::new(
            Arc::clone(&backend),
            Arc::clone(&registry),
            settings,
        ));
        let runner = SuiteRunner::new(Arc::clone(&executor), harness);
        let reaper = Arc::new(Reaper::new(
            Arc::clone(&registry),
            Arc::clone(&backend),
            sweep_interval,
        ));
        let cancel = CancellationToken::new();
        let reaper_task = Arc::clone(&reaper).spawn(cancel.clone());

        info!(
            backend = backend.name(),
            sweep_interval = ?reaper.interval(),
            "Engine started"
        );

        Self {
            backend,
            registry,
            executor,
            runner,
            reaper,
            reaper_task,
            cancel,
        }
    }

    /// Run one snippet.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        self.executor.execute(request).await
    }

    /// Run `code` against `test_cases` in order.
    pub async fn run_suite(&self, code: &str, test_cases: &[TestCase]) -> SuiteResult {
        self.runner.run_suite(code, test_cases).await
    }

    /// Isolation backend in use.
    pub fn backend(&self) -> &Arc<dyn IsolationBackend> {
        &self.backend
    }

    /// Registry of live environments.
    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        &self.registry
    }

    /// Executor shared with the suite runner.
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Stop the reaper and destroy every environment still registered.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.reaper_task.await {
            warn!("Reaper task ended abnormally: {e}");
        }

        let drained = self.reaper.drain().await;
        info!(destroyed = drained.len(), "Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{MockBackend, MockRun, ResourceLimits};

    fn engine(backend: &MockBackend) -> Engine {
        Engine::with_backend(Arc::new(backend.clone()), &Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_execute_through_engine() {
        let backend = MockBackend::always(MockRun::exit(0, "42\n"));
        let engine = engine(&backend);

        let outcome = engine.execute(&ExecutionRequest::new("print(42)")).await;

        assert!(outcome.success());
        assert_eq!(outcome.output(), Some("42\n"));
        assert!(engine.registry().is_empty());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_suite_through_engine() {
        let backend = MockBackend::new(vec![MockRun::exit(0, "2"), MockRun::exit(0, "5")]);
        let engine = engine(&backend);
        let cases = vec![TestCase::new("1", "2"), TestCase::new("2", "4")];

        let suite = engine.run_suite("def solution(x): return x * 2", &cases).await;

        assert_eq!(suite.total_tests(), 2);
        assert_eq!(suite.passed_tests(), 1);
        assert!(!suite.success());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_destroys_remaining_environments() {
        let backend = MockBackend::always(MockRun::exit(0, ""));
        let engine = engine(&backend);

        // Simulate an environment whose owner never cleaned up
        let dir = tempfile::tempdir().unwrap();
        let id = backend
            .provision(&ResourceLimits::default(), dir.path())
            .await
            .unwrap();
        engine.registry().register(id.clone(), Duration::from_secs(3600));

        engine.shutdown().await;

        assert!(backend.live().is_empty());
        assert_eq!(backend.destroyed(), vec![id]);
    }

    #[tokio::test]
    async fn test_disabled_backend_engine_still_starts() {
        let backend = MockBackend::disabled();
        let engine = engine(&backend);

        let outcome = engine.execute(&ExecutionRequest::new("print(1)")).await;

        assert_eq!(outcome.error(), Some("execution unavailable"));
        assert_eq!(backend.provision_count(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_rejected() {
        let backend = Arc::new(MockBackend::always(MockRun::exit(0, "")));

        let mut config = Config::default();
        config.lifecycle.sweep_interval_secs = 0;
        assert!(Engine::with_backend(backend.clone(), &config).is_err());

        let mut config = Config::default();
        config.harness.entry_point = "not an identifier".to_string();
        assert!(Engine::with_backend(backend.clone(), &config).is_err());

        let mut config = Config::default();
        config.resources.memory = "lots".to_string();
        assert!(Engine::with_backend(backend, &config).is_err());
    }

    #[tokio::test]
    async fn test_reaper_runs_inside_engine() {
        let backend = MockBackend::always(MockRun::exit(0, ""));
        let settings = ExecutionSettings::default();
        let engine = Engine::assemble(
            Arc::new(backend.clone()),
            settings,
            HarnessGenerator::default(),
            Duration::from_millis(10),
        );

        let dir = tempfile::tempdir().unwrap();
        let id = backend
            .provision(&ResourceLimits::default(), dir.path())
            .await
            .unwrap();
        engine.registry().register(id.clone(), Duration::ZERO);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while engine.registry().contains(&id) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(backend.live().is_empty());
        engine.shutdown().await;
    }
}
