//! Embedded templates.

/// Default `coderun.toml` configuration.
pub const CODERUN_TOML: &str = include_str!("coderun.toml");

/// Python test harness; `__CODERUN_*__` markers are replaced with literals.
pub(crate) const HARNESS_PY: &str = include_str!("harness.py");
