//! Ephemeral sandboxed code execution.
//!
//! Every submitted snippet runs in its own short-lived Docker container
//! with no network, a read-only view of its program and bounded memory,
//! CPU and process count. On top of single executions the engine runs a
//! submission against an ordered list of test cases through a generated
//! Python harness and aggregates the verdicts.
//!
//! ```no_run
//! use coderun::{Config, Engine, ExecutionRequest};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = Engine::start(&Config::default()).await?;
//! let outcome = engine.execute(&ExecutionRequest::new("print(6 * 7)")).await;
//! assert_eq!(outcome.output().map(str::trim), Some("42"));
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod executor;
pub mod harness;
pub mod logging;
pub mod reaper;
pub mod registry;
pub mod runner;
pub mod sandbox;
pub mod templates;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use executor::{ExecutionSettings, Executor};
pub use harness::HarnessGenerator;
pub use reaper::Reaper;
pub use registry::{LifecycleRegistry, SandboxHandle, SandboxState};
pub use runner::SuiteRunner;
pub use sandbox::{DockerBackend, IsolationBackend, SandboxError, SandboxId};
pub use types::{
    ExecutionOutcome, ExecutionRequest, SuiteResult, TestCase, TestCaseResult,
    EXECUTION_UNAVAILABLE,
};
