//! Test harness generation.
//!
//! Wraps user code and one test case into a standalone Python program.
//! The user code, the raw input and the entry point name are injected
//! as serialized string literals, never spliced in as source, so no
//! input can terminate a literal early.
//!
//! Exit status of the generated program:
//! - `0`: entry point returned; its rendered value is on stdout
//! - `1`: user code raised; `Error: ...` and a traceback are on stderr
//! - `2`: the entry point is missing

use anyhow::Result;
use serde_json::Value;

use crate::templates::HARNESS_PY;
use crate::types::TestCase;

const SOURCE_MARKER: &str = "__CODERUN_SOURCE__";
const INPUT_MARKER: &str = "__CODERUN_INPUT__";
const ENTRY_MARKER: &str = "__CODERUN_ENTRY__";

/// Exit status of a harness whose entry point is missing.
pub const HARNESS_ERROR_EXIT: i64 = 2;

/// Builds harness programs for one entry point name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessGenerator {
    entry_point: String,
}

impl HarnessGenerator {
    /// Generator calling `entry_point`, which must be a Python identifier.
    pub fn new(entry_point: impl Into<String>) -> Result<Self> {
        let entry_point = entry_point.into();
        if !is_identifier(&entry_point) {
            anyhow::bail!("Invalid harness entry point: '{entry_point}'");
        }
        Ok(Self { entry_point })
    }

    /// Name of the function the harness calls.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Wrap `user_code` so it runs against `test_case`.
    pub fn wrap(&self, user_code: &str, test_case: &TestCase) -> String {
        render(
            HARNESS_PY,
            &[
                (SOURCE_MARKER, literal(user_code)),
                (INPUT_MARKER, literal(&test_case.input)),
                (ENTRY_MARKER, literal(&self.entry_point)),
            ],
        )
    }
}

impl Default for HarnessGenerator {
    fn default() -> Self {
        Self {
            entry_point: "solution".to_string(),
        }
    }
}

/// A JSON string literal, which is also a valid Python string literal.
fn literal(text: &str) -> String {
    Value::String(text.to_owned()).to_string()
}

/// Replace markers in a single left-to-right pass so substituted text
/// is never scanned again.
fn render(template: &str, substitutions: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(
        template.len() + substitutions.iter().map(|(_, v)| v.len()).sum::<usize>(),
    );
    let mut rest = template;

    loop {
        let next = substitutions
            .iter()
            .filter_map(|(marker, value)| rest.find(marker).map(|pos| (pos, *marker, value)))
            .min_by_key(|(pos, _, _)| *pos);

        match next {
            Some((pos, marker, value)) => {
                out.push_str(&rest[..pos]);
                out.push_str(value);
                rest = &rest[pos + marker.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
