//! Resource limits applied to every provisioned environment.

use anyhow::{Context, Result};

use super::network::{MountMode, NetworkMode};
use crate::config::ResourceConfig;

/// Resource ceilings passed verbatim to the backend on each provision call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes.
    pub memory_bytes: i64,
    /// CFS quota in microseconds per `cpu_period`.
    pub cpu_quota: i64,
    /// CFS period in microseconds.
    pub cpu_period: i64,
    /// Maximum number of processes inside the environment.
    pub pids_limit: i64,
    /// Network access mode.
    pub network: NetworkMode,
    /// Workspace mount mode.
    pub mount: MountMode,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 256 * 1024 * 1024,
            cpu_quota: 50_000,
            cpu_period: 100_000,
            pids_limit: 64,
            network: NetworkMode::None,
            mount: MountMode::ReadOnly,
        }
    }
}

impl ResourceLimits {
    /// Build limits from the `[resources]` config section.
    ///
    /// Network and mount modes are not configurable: untrusted code
    /// always runs offline against a read-only workspace.
    pub fn from_config(resources: &ResourceConfig) -> Result<Self> {
        let memory_bytes = parse_memory_limit(&resources.memory)?;
        if memory_bytes <= 0 {
            anyhow::bail!("Memory limit must be positive: {}", resources.memory);
        }
        if resources.cpu_quota <= 0 || resources.cpu_period <= 0 {
            anyhow::bail!(
                "CPU quota and period must be positive (got {}/{})",
                resources.cpu_quota,
                resources.cpu_period
            );
        }
        if resources.pids_limit <= 0 {
            anyhow::bail!("Process limit must be positive: {}", resources.pids_limit);
        }

        Ok(Self {
            memory_bytes,
            cpu_quota: resources.cpu_quota,
            cpu_period: resources.cpu_period,
            pids_limit: resources.pids_limit,
            network: NetworkMode::None,
            mount: MountMode::ReadOnly,
        })
    }

    /// Fraction of one CPU the environment may use.
    #[allow(clippy::cast_precision_loss)]
    pub fn cpu_share(&self) -> f64 {
        self.cpu_quota as f64 / self.cpu_period as f64
    }
}

/// Parse memory limit string (e.g., "1g", "256m", "512k") to bytes
pub fn parse_memory_limit(limit: &str) -> Result<i64> {
    let limit = limit.trim().to_lowercase();

    if let Some(num) = limit.strip_suffix('g') {
        let gigs: i64 = num.parse().context("Invalid memory limit")?;
        Ok(gigs * 1024 * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('m') {
        let megs: i64 = num.parse().context("Invalid memory limit")?;
        Ok(megs * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('k') {
        let kilos: i64 = num.parse().context("Invalid memory limit")?;
        Ok(kilos * 1024)
    } else {
        limit.parse().context("Invalid memory limit")
    }
}
