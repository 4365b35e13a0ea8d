use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Todo,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
            TestStatus::Todo => "todo",
        }
    }

    /// Whether a test with this status may carry error records.
    pub fn allows_errors(&self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Todo)
    }

    /// Rollup weight of a child status: Failed > Todo > Passed > Skipped.
    ///
    /// Taking the heaviest child yields Skipped only when every child is
    /// skipped, so one passed sibling is enough to lift a suite to Passed.
    pub fn priority(&self) -> u8 {
        match self {
            TestStatus::Failed => 3,
            TestStatus::Todo => 2,
            TestStatus::Passed => 1,
            TestStatus::Skipped => 0,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
