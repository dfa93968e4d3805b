//! Engine configuration loaded from `coderun.toml`.
//!
//! Every value is read once at startup and frozen for the lifetime of
//! the engine. A missing file means all defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "coderun.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Container image and backend connection.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Per-execution resource ceilings and timeout.
    #[serde(default)]
    pub resources: ResourceConfig,
    /// Environment TTL, reaper interval and concurrency.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Test harness settings.
    #[serde(default)]
    pub harness: HarnessConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Isolation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image used for every execution
    #[serde(default = "default_image")]
    pub image: String,

    /// Interpreter command line; the program path is appended
    #[serde(default = "default_command")]
    pub command: String,

    /// Docker socket (e.g. "unix:///var/run/docker.sock").
    /// Uses the platform default when unset.
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Pull the image at startup if it is missing locally
    #[serde(default = "default_true")]
    pub pull_missing_image: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            command: default_command(),
            docker_host: None,
            pull_missing_image: true,
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory limit (e.g., "256m")
    #[serde(default = "default_memory")]
    pub memory: String,

    /// CFS quota in microseconds (50000 with the default period = 0.5 CPU)
    #[serde(default = "default_cpu_quota")]
    pub cpu_quota: i64,

    /// CFS period in microseconds
    #[serde(default = "default_cpu_period")]
    pub cpu_period: i64,

    /// Maximum number of processes
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,

    /// Default execution timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            cpu_quota: default_cpu_quota(),
            cpu_period: default_cpu_period(),
            pids_limit: default_pids_limit(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Lifecycle registry and reaper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Seconds after creation at which an environment is force-destroyed
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Seconds between reaper sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Maximum concurrent executions (0 = unbounded)
    #[serde(default)]
    pub max_concurrent: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_concurrent: 0,
        }
    }
}

/// Test harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Function the harness calls with each test input
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            entry_point: default_entry_point(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_image() -> String {
    "python:3.11-slim".to_string()
}

fn default_command() -> String {
    "python".to_string()
}

fn default_memory() -> String {
    "256m".to_string()
}

fn default_cpu_quota() -> i64 {
    50_000
}

fn default_cpu_period() -> i64 {
    100_000
}

fn default_pids_limit() -> i64 {
    64
}

fn default_timeout() -> u64 {
    30
}

fn default_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_entry_point() -> String {
    "solution".to_string()
}

impl Config {
    /// Load configuration from `coderun.toml` in `dir`, using defaults if not found
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_file(&dir.join(CONFIG_FILE))
    }

    /// Load configuration from an explicit path, using defaults if not found
    pub fn load_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }
}
