//! CLI command implementations.
//!
//! Each submodule implements one `coderun` subcommand with formatting
//! kept pure and IO at the top level.

pub mod clean;
pub mod exec;
pub mod format;
pub mod init;

use anyhow::{Context, Result};
use std::path::Path;

use coderun::config::{Config, CONFIG_FILE};

/// Load `path`, or `coderun.toml` in the working directory when unset.
///
/// An explicitly named file must exist.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_file(path)
        }
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            Config::load(&cwd).with_context(|| format!("Failed to load {CONFIG_FILE}"))
        }
    }
}
