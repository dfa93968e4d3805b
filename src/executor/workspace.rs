//! Per-execution scratch directory mounted into the environment.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::sandbox::{PROGRAM_FILE, STDIN_FILE};

/// Host directory holding the program and its stdin.
///
/// Removed from disk when dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Write `code` and `input` into a fresh directory.
    pub fn create(code: &str, input: Option<&str>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("coderun-")
            .tempdir()
            .context("Failed to create workspace directory")?;

        let program = dir.path().join(PROGRAM_FILE);
        fs::write(&program, code)
            .with_context(|| format!("Failed to write {}", program.display()))?;

        let stdin = dir.path().join(STDIN_FILE);
        fs::write(&stdin, input.unwrap_or_default())
            .with_context(|| format!("Failed to write {}", stdin.display()))?;

        open_permissions(dir.path(), &[&program, &stdin])?;
        Ok(Self { dir })
    }

    /// Directory to mount.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// The container user is not the host user, so the mount must be
/// world-readable.
#[cfg(unix)]
fn open_permissions(dir: &Path, files: &[&Path]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    for file in files {
        fs::set_permissions(file, fs::Permissions::from_mode(0o644))
            .with_context(|| format!("Failed to set permissions on {}", file.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn open_permissions(_dir: &Path, _files: &[&Path]) -> Result<()> {
    Ok(())
}
