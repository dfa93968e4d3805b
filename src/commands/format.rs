//! Formatting functions for execution and suite results.
//!
//! Pure functions returning strings; printing happens in the commands.

use colored::Colorize;
use std::fmt::Write;
use std::time::Duration;

use coderun::{ExecutionOutcome, SuiteResult, TestCaseResult};

/// Formats a duration for display (e.g., "1.25s" or "340ms").
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

/// Formats a single execution outcome.
pub(crate) fn format_outcome(outcome: &ExecutionOutcome) -> String {
    let mut out = String::new();

    if let Some(output) = outcome.output().filter(|o| !o.is_empty()) {
        write!(&mut out, "{output}").unwrap();
        if !output.ends_with('\n') {
            writeln!(&mut out).unwrap();
        }
    }

    let elapsed = format_elapsed(outcome.execution_time()).dimmed();
    match outcome.error() {
        None => writeln!(&mut out, "{} Succeeded in {elapsed}", "✓".green().bold()).unwrap(),
        Some(error) => writeln!(
            &mut out,
            "{} {} ({elapsed})",
            "✗".red().bold(),
            error.red()
        )
        .unwrap(),
    }

    out
}

/// Formats one test case line plus its diagnostics.
fn format_case(out: &mut String, result: &TestCaseResult) {
    let mark = if result.passed {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    let label = if result.description.is_empty() {
        format!("Test {}", result.test_case)
    } else {
        format!("Test {}: {}", result.test_case, result.description)
    };
    let hidden = if result.hidden { " (hidden)" } else { "" };

    writeln!(
        out,
        "  {mark} {label}{}  {}",
        hidden.dimmed(),
        format_elapsed(result.execution_time).dimmed()
    )
    .unwrap();

    if result.passed {
        return;
    }
    if !result.input.is_empty() {
        writeln!(out, "      input:    {}", result.input).unwrap();
    }
    if !result.expected.is_empty() {
        writeln!(out, "      expected: {}", result.expected.cyan()).unwrap();
    }
    if let Some(actual) = &result.actual {
        writeln!(out, "      actual:   {}", actual.trim_end().yellow()).unwrap();
    }
    if let Some(error) = &result.error {
        writeln!(out, "      error:    {}", error.red()).unwrap();
    }
}

/// Formats a suite result with one line per case and a summary.
pub(crate) fn format_suite(suite: &SuiteResult) -> String {
    let mut out = String::new();

    for result in suite.results() {
        format_case(&mut out, result);
    }

    let summary = format!("{}/{} passed", suite.passed_tests(), suite.total_tests());
    if suite.success() {
        writeln!(&mut out, "\n{} {}", "✓".green().bold(), summary.green()).unwrap();
    } else {
        writeln!(&mut out, "\n{} {}", "✗".red().bold(), summary.red()).unwrap();
    }

    out
}
