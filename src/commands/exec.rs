//! Run one source file in a sandbox.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use coderun::{Config, Engine, ExecutionRequest};

use super::format::format_outcome;

/// Options for `coderun exec`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExecOptions {
    /// Text fed to the program's stdin.
    pub input: Option<String>,
    /// Timeout override in seconds.
    pub timeout_secs: Option<u64>,
    /// Print the outcome as JSON.
    pub json: bool,
}

/// Builds the request for `code` from the CLI options.
fn build_request(code: String, options: &ExecOptions) -> Result<ExecutionRequest> {
    let mut request = ExecutionRequest::new(code);
    if let Some(input) = &options.input {
        request = request.with_input(input.clone());
    }
    match options.timeout_secs {
        Some(0) => anyhow::bail!("--timeout must be positive"),
        Some(secs) => request = request.with_timeout(Duration::from_secs(secs)),
        None => {}
    }
    Ok(request)
}

/// Entry point: executes `file` and prints the outcome.
///
/// Fails when the program did not succeed so the process exits non-zero.
pub(crate) async fn run(config: &Config, file: &Path, options: ExecOptions) -> Result<()> {
    let code =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let request = build_request(code, &options)?;

    let engine = Engine::start(config).await?;
    info!("Executing {}", file.display());

    let outcome = tokio::select! {
        outcome = engine.execute(&request) => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    engine.shutdown().await;
    let outcome = outcome.context("Interrupted")?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", format_outcome(&outcome));
    }

    if !outcome.success() {
        anyhow::bail!("Execution failed");
    }
    Ok(())
}
