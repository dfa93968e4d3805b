//! Write a default `coderun.toml` into the working directory.
//!
//! The decision logic takes closures for filesystem access so it can be
//! tested without touching disk.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write;
use std::fs;
use std::path::Path;
use tracing::info;

use coderun::config::CONFIG_FILE;
use coderun::templates::CODERUN_TOML;

/// What happened to the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitOutcome {
    /// No config existed; the default was written.
    Created,
    /// An existing config was replaced (`--force`).
    Overwritten,
    /// An existing config was left alone.
    Kept,
}

/// Decide whether to write `content` to `path` and do so.
fn write_default<E, W>(path: &Path, content: &str, force: bool, exists: E, write: W) -> Result<InitOutcome>
where
    E: Fn(&Path) -> bool,
    W: FnOnce(&Path, &str) -> Result<()>,
{
    let existed = exists(path);
    if existed && !force {
        return Ok(InitOutcome::Kept);
    }
    write(path, content)?;
    Ok(if existed {
        InitOutcome::Overwritten
    } else {
        InitOutcome::Created
    })
}

/// Formats the init result for display.
fn format_outcome(outcome: InitOutcome) -> String {
    let mut out = String::new();
    let file = CONFIG_FILE.cyan();

    match outcome {
        InitOutcome::Created => {
            writeln!(&mut out, "\n{} coderun initialized successfully!", "✓".green().bold()).unwrap();
            writeln!(&mut out, "  {file} - engine configuration").unwrap();
        }
        InitOutcome::Overwritten => {
            writeln!(&mut out, "\n{} coderun initialized successfully!", "✓".green().bold()).unwrap();
            writeln!(&mut out, "  {} {file} (overwritten)", "↻".blue()).unwrap();
        }
        InitOutcome::Kept => {
            writeln!(
                &mut out,
                "\n{} {file} already exists, use --force to overwrite",
                "⊘".yellow()
            )
            .unwrap();
            return out;
        }
    }

    writeln!(&mut out, "\n{}", "Next steps:".yellow().bold()).unwrap();
    writeln!(&mut out, "  1. Edit {file} to set the image and resource limits").unwrap();
    writeln!(&mut out, "  2. Run {} to try a snippet", "coderun exec main.py".green()).unwrap();
    writeln!(
        &mut out,
        "  3. Run {} to check a solution",
        "coderun test solution.py --cases cases.json".green()
    )
    .unwrap();
    out
}

/// Entry point: writes the default config in the current directory.
pub(crate) fn run(force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    info!("Initializing coderun in {}", cwd.display());

    let outcome = write_default(
        Path::new(CONFIG_FILE),
        CODERUN_TOML,
        force,
        |path| cwd.join(path).exists(),
        |path, content| {
            fs::write(cwd.join(path), content)
                .with_context(|| format!("Failed to write {}", path.display()))
        },
    )?;

    print!("{}", format_outcome(outcome));
    Ok(())
}
