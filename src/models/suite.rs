use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use super::status::TestStatus;
use super::test::Test;
use crate::error::ProtocolError;

/// Per-status test tallies over a whole subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub total: usize,
    pub passed: usize,
    pub skipped: usize,
    pub todo: usize,
    pub failed: usize,
}

impl TestCounts {
    /// Count one test in the bucket matching its status.
    pub fn record(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Todo => self.todo += 1,
            TestStatus::Failed => self.failed += 1,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.passed + self.skipped + self.todo + self.failed == self.total
    }
}

impl AddAssign for TestCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.passed += rhs.passed;
        self.skipped += rhs.skipped;
        self.todo += rhs.todo;
        self.failed += rhs.failed;
    }
}

/// Inner node of the canonical tree. The run itself is the unnamed root suite.
///
/// `status`, `runtime` and `test_counts` are derived once by
/// [`Suite::finalize`] and never touched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
    pub name: String,
    pub full_name: Vec<String>,
    pub tests: Vec<Test>,
    pub child_suites: Vec<Suite>,
    pub status: Option<TestStatus>,
    pub runtime: Option<f64>,
    pub test_counts: TestCounts,
}

impl Suite {
    pub(crate) fn root() -> Self {
        Self::new(String::new(), Vec::new())
    }

    pub(crate) fn new(name: String, full_name: Vec<String>) -> Self {
        Self {
            name,
            full_name,
            tests: Vec::new(),
            child_suites: Vec::new(),
            status: None,
            runtime: None,
            test_counts: TestCounts::default(),
        }
    }

    /// Full name a direct child named `name` would get.
    pub(crate) fn child_full_name(&self, name: &str) -> Vec<String> {
        let mut full_name = self.full_name.clone();
        full_name.push(name.to_string());
        full_name
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_some()
    }

    /// Roll status, runtime and counts up from the direct children.
    ///
    /// Every child must already be finished; child suites contribute their own
    /// summed counts, so the result covers the whole subtree.
    pub(crate) fn finalize(&mut self) -> Result<(), ProtocolError> {
        if self.is_finished() {
            return Err(ProtocolError::AlreadyFinalized {
                name: self.name.clone(),
            });
        }

        let mut counts = TestCounts::default();
        let mut runtime = 0.0;
        let mut status: Option<TestStatus> = None;

        for test in &self.tests {
            let Some(test_status) = test.status else {
                return Err(ProtocolError::TestStillOpen {
                    name: test.name.clone(),
                });
            };
            counts.record(test_status);
            runtime += test.runtime.unwrap_or(0.0);
            status = Some(heaviest(status, test_status));
        }

        for child in &self.child_suites {
            let Some(child_status) = child.status else {
                return Err(ProtocolError::SuiteStillOpen {
                    name: child.name.clone(),
                });
            };
            counts += child.test_counts;
            runtime += child.runtime.unwrap_or(0.0);
            status = Some(heaviest(status, child_status));
        }

        // An empty suite ran nothing, same as one whose tests were all skipped.
        let status = status.unwrap_or(TestStatus::Skipped);

        self.runtime = (status != TestStatus::Skipped).then_some(runtime);
        self.status = Some(status);
        self.test_counts = counts;
        Ok(())
    }
}

fn heaviest(acc: Option<TestStatus>, next: TestStatus) -> TestStatus {
    match acc {
        Some(prev) if prev.priority() >= next.priority() => prev,
        _ => next,
    }
}
