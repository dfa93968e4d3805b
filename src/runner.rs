//! Test suite runner.
//!
//! Runs one submission against each test case in order, one fresh
//! environment per case, and compares trimmed output for exact textual
//! equality.

use std::sync::Arc;
use tracing::{debug, info};

use crate::executor::Executor;
use crate::harness::HarnessGenerator;
use crate::types::{ExecutionRequest, SuiteResult, TestCase, TestCaseResult};

/// Evaluates submissions against test suites.
pub struct SuiteRunner {
    executor: Arc<Executor>,
    harness: HarnessGenerator,
}

impl SuiteRunner {
    /// Create a runner executing harnessed programs on `executor`.
    pub fn new(executor: Arc<Executor>, harness: HarnessGenerator) -> Self {
        Self { executor, harness }
    }

    /// Harness generator in use.
    pub fn harness(&self) -> &HarnessGenerator {
        &self.harness
    }

    /// Run `code` against every case in order.
    ///
    /// A case that fails to run is recorded as failed and the remaining
    /// cases still run.
    pub async fn run_suite(&self, code: &str, test_cases: &[TestCase]) -> SuiteResult {
        let mut results = Vec::with_capacity(test_cases.len());
        for (index, case) in test_cases.iter().enumerate() {
            let result = self.run_case(index + 1, code, case).await;
            debug!(
                test_case = result.test_case,
                passed = result.passed,
                "Test case finished"
            );
            results.push(result);
        }

        let suite = SuiteResult::from_results(results);
        info!(
            passed = suite.passed_tests(),
            total = suite.total_tests(),
            "Suite finished"
        );
        suite
    }

    async fn run_case(&self, position: usize, code: &str, case: &TestCase) -> TestCaseResult {
        let program = self.harness.wrap(code, case);
        let outcome = self.executor.execute(&ExecutionRequest::new(program)).await;

        let base = TestCaseResult {
            test_case: position,
            passed: false,
            input: case.input.clone(),
            expected: case.expected_output.trim().to_string(),
            actual: None,
            error: None,
            description: case.description.clone(),
            hidden: case.is_hidden,
            execution_time: outcome.execution_time(),
        };

        if outcome.success() {
            let actual = outcome.output().unwrap_or_default().trim().to_string();
            TestCaseResult {
                passed: actual == base.expected,
                actual: Some(actual),
                ..base
            }
        } else {
            TestCaseResult {
                actual: outcome.output().map(str::to_string),
                error: outcome.error().map(str::to_string),
                ..base
            }
        }
    }
}
