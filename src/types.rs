//! Requests and results exchanged with the engine.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;

/// Error text of an outcome produced while the backend is disabled.
pub const EXECUTION_UNAVAILABLE: &str = "execution unavailable";

/// One snippet of source to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    code: String,
    input: Option<String>,
    timeout: Option<Duration>,
}

impl ExecutionRequest {
    /// Request to run `code` with no input and the default timeout.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            input: None,
            timeout: None,
        }
    }

    /// Feed `input` to the program's stdin.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Override the configured execution timeout.
    ///
    /// The executor fails requests whose timeout is zero or not below
    /// the sandbox TTL.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Source text.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Raw stdin text, if any.
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// Timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Result of one execution.
///
/// `error` is set exactly when `success` is false; the constructors are
/// the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    success: bool,
    output: Option<String>,
    error: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    execution_time: Duration,
}

impl ExecutionOutcome {
    /// The program ran to completion with exit status 0.
    pub fn succeeded(output: String, execution_time: Duration) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            execution_time,
        }
    }

    /// The program (or the environment around it) failed.
    pub fn failed(
        error: impl Into<String>,
        output: Option<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
            execution_time,
        }
    }

    /// The isolation backend is disabled; nothing was attempted.
    pub fn unavailable() -> Self {
        Self::failed(EXECUTION_UNAVAILABLE, None, Duration::ZERO)
    }

    /// Whether the program exited with status 0.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Captured stdout and stderr; `None` when nothing could be retrieved.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Failure description; `None` on success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Wall-clock time spent on the execution.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }
}

/// One test case of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Raw input text, embedded verbatim in the harness.
    #[serde(default, deserialize_with = "input_text")]
    pub input: String,
    /// Expected printed output.
    #[serde(deserialize_with = "expected_text")]
    pub expected_output: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether the case is withheld from the end user.
    #[serde(default, alias = "hidden")]
    pub is_hidden: bool,
}

impl TestCase {
    /// A visible test case with no description.
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            description: String::new(),
            is_hidden: false,
        }
    }

    /// Parse a suite from JSON: either an array of test cases or a
    /// question record with a `test_cases` array.
    pub fn parse_suite(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        #[derive(Deserialize)]
        struct Question {
            test_cases: Vec<TestCase>,
        }

        if json.trim_start().starts_with('[') {
            serde_json::from_str(json)
        } else {
            serde_json::from_str::<Question>(json).map(|q| q.test_cases)
        }
    }
}

/// Outcome of one test case within a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseResult {
    /// 1-based position of the case in the suite.
    pub test_case: usize,
    /// Whether the trimmed output matched exactly.
    pub passed: bool,
    /// Input text of the case.
    pub input: String,
    /// Trimmed expected output.
    pub expected: String,
    /// Trimmed actual output, or the raw partial output when the run failed.
    pub actual: Option<String>,
    /// Failure description when the run itself failed.
    pub error: Option<String>,
    /// Description copied from the case.
    pub description: String,
    /// Whether the case is withheld from the end user.
    pub hidden: bool,
    /// Wall-clock time of the run.
    #[serde(serialize_with = "serialize_secs")]
    pub execution_time: Duration,
}

/// Aggregated outcome of a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteResult {
    success: bool,
    test_results: Vec<TestCaseResult>,
    total_tests: usize,
    passed_tests: usize,
}

impl SuiteResult {
    /// Aggregate per-case results; the counts and the overall flag are
    /// always derived from `results`.
    pub fn from_results(results: Vec<TestCaseResult>) -> Self {
        let passed_tests = results.iter().filter(|r| r.passed).count();
        let total_tests = results.len();
        Self {
            success: passed_tests == total_tests,
            test_results: results,
            total_tests,
            passed_tests,
        }
    }

    /// True iff every case passed (vacuously true for an empty suite).
    pub fn success(&self) -> bool {
        self.success
    }

    /// Per-case results in suite order.
    pub fn results(&self) -> &[TestCaseResult] {
        &self.test_results
    }

    /// Number of cases run.
    pub fn total_tests(&self) -> usize {
        self.total_tests
    }

    /// Number of cases that passed.
    pub fn passed_tests(&self) -> usize {
        self.passed_tests
    }

    /// Copy safe to show to the submitter: hidden cases keep only their
    /// pass flag and timing.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let results = self
            .test_results
            .iter()
            .map(|r| {
                if !r.hidden {
                    return r.clone();
                }
                TestCaseResult {
                    input: String::new(),
                    expected: String::new(),
                    actual: None,
                    error: (!r.passed).then(|| "hidden test case failed".to_string()),
                    description: String::new(),
                    ..r.clone()
                }
            })
            .collect();
        Self::from_results(results)
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Inputs may be stored as structured JSON; the harness re-parses the text.
fn input_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Expected outputs may be stored as structured JSON; render them the
/// way the harness prints a returned value.
fn expected_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(render_expected(&Value::deserialize(deserializer)?))
}

/// Text the harness prints for a returned value equal to `value`.
pub fn render_expected(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => python_repr(other),
    }
}

fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => python_str_repr(s),
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(python_repr).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_str_repr(k), python_repr(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn python_str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
