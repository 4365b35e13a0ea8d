use anyhow::Result;

use super::Reporter;
use crate::aggregator::EventKind;
use crate::models::{Suite, Test};

/// Owned copy of the node an event carried.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Suite(Suite),
    Test(Test),
}

impl Snapshot {
    pub fn full_name(&self) -> &[String] {
        match self {
            Snapshot::Suite(suite) => &suite.full_name,
            Snapshot::Test(test) => &test.full_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub snapshot: Snapshot,
}

/// Keeps every event it receives, in arrival order.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Vec<RecordedEvent>,
}

impl Recorder {
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|e| e.kind).collect()
    }

    /// `kind:name > path` per event, handy for asserting emission order.
    pub fn trace(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|e| format!("{}:{}", e.kind, e.snapshot.full_name().join(" > ")))
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    fn push_suite(&mut self, kind: EventKind, suite: &Suite) {
        self.events.push(RecordedEvent {
            kind,
            snapshot: Snapshot::Suite(suite.clone()),
        });
    }

    fn push_test(&mut self, kind: EventKind, test: &Test) {
        self.events.push(RecordedEvent {
            kind,
            snapshot: Snapshot::Test(test.clone()),
        });
    }
}

impl Reporter for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_run_start(&mut self, run: &Suite) -> Result<()> {
        self.push_suite(EventKind::RunStart, run);
        Ok(())
    }

    fn on_suite_start(&mut self, suite: &Suite) -> Result<()> {
        self.push_suite(EventKind::SuiteStart, suite);
        Ok(())
    }

    fn on_test_start(&mut self, test: &Test) -> Result<()> {
        self.push_test(EventKind::TestStart, test);
        Ok(())
    }

    fn on_test_end(&mut self, test: &Test) -> Result<()> {
        self.push_test(EventKind::TestEnd, test);
        Ok(())
    }

    fn on_suite_end(&mut self, suite: &Suite) -> Result<()> {
        self.push_suite(EventKind::SuiteEnd, suite);
        Ok(())
    }

    fn on_run_end(&mut self, run: &Suite) -> Result<()> {
        self.push_suite(EventKind::RunEnd, run);
        Ok(())
    }
}
