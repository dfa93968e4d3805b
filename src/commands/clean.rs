//! Remove sandboxes left behind by crashed processes.
//!
//! Every container this crate creates carries the managed label, so
//! anything still labelled when no engine is running is an orphan.

use anyhow::Result;
use colored::Colorize;
use std::fmt::Write;

use coderun::sandbox::IsolationBackend;
use coderun::{Config, DockerBackend};

/// Format the clean results as a displayable string
pub(crate) fn format_results(removed: u32) -> String {
    let mut out = String::new();
    if removed == 0 {
        writeln!(&mut out, "{} No orphaned sandboxes found.", "ℹ".blue()).unwrap();
    } else {
        writeln!(
            &mut out,
            "{} Removed {} orphaned sandbox(es).",
            "✓".green(),
            removed.to_string().bold()
        )
        .unwrap();
    }
    out
}

/// Removes every managed sandbox through `backend`.
pub(crate) async fn clean_orphans(backend: &dyn IsolationBackend) -> Result<u32> {
    if !backend.is_available() {
        anyhow::bail!("{} backend is not available", backend.name());
    }
    Ok(backend.cleanup_orphaned().await?)
}

/// Entry point: connects to Docker and removes orphaned sandboxes.
pub(crate) async fn run(config: &Config) -> Result<()> {
    let backend = DockerBackend::connect(&config.sandbox).await?;
    let removed = clean_orphans(&backend).await?;
    print!("{}", format_results(removed));
    Ok(())
}
