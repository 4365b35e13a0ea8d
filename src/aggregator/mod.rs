pub mod events;

use crate::error::ProtocolError;
use crate::models::{Suite, Test, TestError, TestStatus};
use crate::reporter::{Registry, Reporter, ReporterFailure};

pub use events::{Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Finished,
}

/// Builds the canonical suite tree from intake calls and fans each finished
/// step out to the registered reporters.
///
/// Open suites live on a stack (`open[0]` is the run's root). A suite is
/// moved into its parent's `child_suites` once it has been finalized and
/// announced, so everything below the stack top is already immutable.
pub struct Aggregator {
    phase: Phase,
    open: Vec<Suite>,
    run: Option<Suite>,
    registry: Registry,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            open: Vec::new(),
            run: None,
            registry: Registry::new(),
        }
    }

    pub fn register<R: Reporter + 'static>(&mut self, reporter: R) {
        self.registry.register(Box::new(reporter));
    }

    /// The finalized root, once `run_end` has succeeded.
    pub fn run(&self) -> Option<&Suite> {
        self.run.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Number of suites currently open, the root included.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn reporter_failures(&self) -> &[ReporterFailure] {
        self.registry.failures()
    }

    pub fn run_start(&mut self) -> Result<(), ProtocolError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Running => return Err(ProtocolError::RunAlreadyStarted),
            Phase::Finished => return Err(ProtocolError::RunAlreadyFinished),
        }
        tracing::debug!("runStart");

        self.phase = Phase::Running;
        self.open.push(Suite::root());
        self.registry.publish(Event::RunStart(&self.open[0]));
        Ok(())
    }

    pub fn suite_start(&mut self, name: impl Into<String>) -> Result<(), ProtocolError> {
        let name = name.into();
        let parent = self.current()?;
        ensure_no_open_test(parent)?;
        tracing::debug!(suite = %name, depth = self.open.len(), "suiteStart");

        let suite = Suite::new(name.clone(), parent.child_full_name(&name));
        self.open.push(suite);
        if let Some(suite) = self.open.last() {
            self.registry.publish(Event::SuiteStart(suite));
        }
        Ok(())
    }

    pub fn test_start(&mut self, name: impl Into<String>) -> Result<(), ProtocolError> {
        let name = name.into();
        let suite = innermost(self.phase, &mut self.open)?;
        ensure_no_open_test(suite)?;
        tracing::debug!(test = %name, "testStart");

        let full_name = suite.full_name.clone();
        suite.tests.push(Test::new(name, full_name));
        if let Some(test) = suite.tests.last() {
            self.registry.publish(Event::TestStart(test));
        }
        Ok(())
    }

    pub fn test_end(
        &mut self,
        status: TestStatus,
        runtime: Option<f64>,
        errors: Vec<TestError>,
    ) -> Result<(), ProtocolError> {
        let suite = innermost(self.phase, &mut self.open)?;
        let test = suite
            .tests
            .last_mut()
            .filter(|t| !t.is_finished())
            .ok_or(ProtocolError::NoOpenTest)?;
        test.finish(status, runtime, errors)?;
        tracing::debug!(test = %test.name, %status, ?runtime, "testEnd");

        self.registry.publish(Event::TestEnd(&*test));
        Ok(())
    }

    pub fn suite_end(&mut self) -> Result<(), ProtocolError> {
        self.current()?;
        if self.open.len() < 2 {
            return Err(ProtocolError::NoOpenSuite);
        }
        let Some(mut suite) = self.open.pop() else {
            return Err(ProtocolError::NoOpenSuite);
        };
        if let Err(e) = suite.finalize() {
            self.open.push(suite);
            return Err(e);
        }
        tracing::debug!(
            suite = %suite.name,
            status = ?suite.status,
            total = suite.test_counts.total,
            "suiteEnd"
        );

        self.registry.publish(Event::SuiteEnd(&suite));
        if let Some(parent) = self.open.last_mut() {
            parent.child_suites.push(suite);
        }
        Ok(())
    }

    pub fn run_end(&mut self) -> Result<(), ProtocolError> {
        self.current()?;
        if self.open.len() > 1 {
            return Err(ProtocolError::SuitesStillOpen {
                open: self.open.len() - 1,
            });
        }
        let Some(mut run) = self.open.pop() else {
            return Err(ProtocolError::RunNotStarted);
        };
        if let Err(e) = run.finalize() {
            self.open.push(run);
            return Err(e);
        }
        tracing::debug!(status = ?run.status, counts = ?run.test_counts, "runEnd");

        self.phase = Phase::Finished;
        let run = self.run.insert(run);
        self.registry.publish(Event::RunEnd(&*run));
        Ok(())
    }

    fn current(&self) -> Result<&Suite, ProtocolError> {
        match self.phase {
            Phase::Idle => Err(ProtocolError::RunNotStarted),
            Phase::Finished => Err(ProtocolError::RunAlreadyFinished),
            Phase::Running => self.open.last().ok_or(ProtocolError::RunNotStarted),
        }
    }
}

/// Innermost open suite, borrowed apart from the registry so events can be
/// published while the node is still in hand.
fn innermost(phase: Phase, open: &mut [Suite]) -> Result<&mut Suite, ProtocolError> {
    match phase {
        Phase::Idle => Err(ProtocolError::RunNotStarted),
        Phase::Finished => Err(ProtocolError::RunAlreadyFinished),
        Phase::Running => open.last_mut().ok_or(ProtocolError::RunNotStarted),
    }
}

fn ensure_no_open_test(suite: &Suite) -> Result<(), ProtocolError> {
    match suite.tests.last() {
        Some(test) if !test.is_finished() => Err(ProtocolError::TestStillOpen {
            name: test.name.clone(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::models::TestCounts;
    use crate::reporter::{Recorder, Snapshot};
    use pretty_assertions::assert_eq;

    fn recording() -> (Aggregator, Rc<RefCell<Recorder>>) {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let mut aggregator = Aggregator::new();
        aggregator.register(Rc::clone(&recorder));
        (aggregator, recorder)
    }

    fn pass(agg: &mut Aggregator, name: &str, ms: f64) {
        agg.test_start(name).unwrap();
        agg.test_end(TestStatus::Passed, Some(ms), Vec::new())
            .unwrap();
    }

    fn skip(agg: &mut Aggregator, name: &str) {
        agg.test_start(name).unwrap();
        agg.test_end(TestStatus::Skipped, None, Vec::new()).unwrap();
    }

    #[test]
    fn emits_depth_first_order() {
        let (mut agg, recorder) = recording();
        agg.run_start().unwrap();
        agg.suite_start("outer").unwrap();
        pass(&mut agg, "a", 1.0);
        agg.suite_start("inner").unwrap();
        pass(&mut agg, "b", 1.0);
        agg.suite_end().unwrap();
        agg.suite_end().unwrap();
        pass(&mut agg, "top", 1.0);
        agg.run_end().unwrap();

        assert_eq!(
            recorder.borrow().trace(),
            vec![
                "runStart:",
                "suiteStart:outer",
                "testStart:outer > a",
                "testEnd:outer > a",
                "suiteStart:outer > inner",
                "testStart:outer > inner > b",
                "testEnd:outer > inner > b",
                "suiteEnd:outer > inner",
                "suiteEnd:outer",
                "testStart:top",
                "testEnd:top",
                "runEnd:",
            ]
        );
    }

    #[test]
    fn start_snapshots_have_no_status() {
        let (mut agg, recorder) = recording();
        agg.run_start().unwrap();
        agg.suite_start("s").unwrap();

        let recorder = recorder.borrow();
        for event in recorder.events() {
            let Snapshot::Suite(suite) = &event.snapshot else {
                panic!("expected a suite snapshot");
            };
            assert_eq!(suite.status, None);
            assert_eq!(suite.runtime, None);
        }
    }

    #[test]
    fn run_rolls_up_nested_counts() {
        let (mut agg, _recorder) = recording();
        agg.run_start().unwrap();
        agg.suite_start("s").unwrap();
        pass(&mut agg, "a", 2.0);
        skip(&mut agg, "b");
        agg.suite_start("nested").unwrap();
        agg.test_start("c").unwrap();
        agg.test_end(TestStatus::Todo, Some(3.0), vec![TestError::new("later")])
            .unwrap();
        agg.suite_end().unwrap();
        agg.suite_end().unwrap();
        agg.run_end().unwrap();

        let run = agg.run().unwrap();
        assert_eq!(run.status, Some(TestStatus::Todo));
        assert_eq!(run.runtime, Some(5.0));
        assert_eq!(
            run.test_counts,
            TestCounts {
                total: 3,
                passed: 1,
                skipped: 1,
                todo: 1,
                failed: 0,
            }
        );
        let suite = &run.child_suites[0];
        assert_eq!(suite.child_suites[0].full_name, vec!["s", "nested"]);
        assert_eq!(suite.tests[1].full_name, vec!["s", "b"]);
    }

    #[test]
    fn skipped_only_suite_has_no_runtime() {
        let (mut agg, _recorder) = recording();
        agg.run_start().unwrap();
        agg.suite_start("s").unwrap();
        skip(&mut agg, "a");
        skip(&mut agg, "b");
        agg.suite_end().unwrap();
        agg.run_end().unwrap();

        let run = agg.run().unwrap();
        assert_eq!(run.status, Some(TestStatus::Skipped));
        assert_eq!(run.runtime, None);
        assert_eq!(run.child_suites[0].runtime, None);
    }

    #[test]
    fn protocol_violations_are_reported() {
        let mut agg = Aggregator::new();
        assert_eq!(agg.suite_start("s"), Err(ProtocolError::RunNotStarted));
        assert_eq!(agg.run_end(), Err(ProtocolError::RunNotStarted));

        agg.run_start().unwrap();
        assert_eq!(agg.run_start(), Err(ProtocolError::RunAlreadyStarted));
        assert_eq!(agg.suite_end(), Err(ProtocolError::NoOpenSuite));
        assert_eq!(
            agg.test_end(TestStatus::Passed, Some(1.0), Vec::new()),
            Err(ProtocolError::NoOpenTest)
        );

        agg.suite_start("s").unwrap();
        assert_eq!(agg.run_end(), Err(ProtocolError::SuitesStillOpen { open: 1 }));

        agg.test_start("t").unwrap();
        let open = ProtocolError::TestStillOpen { name: "t".into() };
        assert_eq!(agg.test_start("u"), Err(open.clone()));
        assert_eq!(agg.suite_start("inner"), Err(open.clone()));
        assert_eq!(agg.suite_end(), Err(open));
        assert_eq!(agg.depth(), 2);

        agg.test_end(TestStatus::Passed, Some(1.0), Vec::new())
            .unwrap();
        assert_eq!(
            agg.test_end(TestStatus::Passed, Some(1.0), Vec::new()),
            Err(ProtocolError::NoOpenTest)
        );
        agg.suite_end().unwrap();
        agg.run_end().unwrap();

        assert!(agg.is_finished());
        assert_eq!(agg.test_start("late"), Err(ProtocolError::RunAlreadyFinished));
        assert_eq!(agg.run_start(), Err(ProtocolError::RunAlreadyFinished));
    }

    #[test]
    fn rejected_test_end_keeps_test_open() {
        let mut agg = Aggregator::new();
        agg.run_start().unwrap();
        agg.test_start("t").unwrap();
        assert!(matches!(
            agg.test_end(TestStatus::Failed, None, Vec::new()),
            Err(ProtocolError::MissingRuntime { .. })
        ));
        agg.test_end(TestStatus::Failed, Some(0.0), vec![TestError::new("x")])
            .unwrap();
        agg.run_end().unwrap();
        assert_eq!(agg.run().unwrap().test_counts.failed, 1);
    }

    #[test]
    fn panicking_reporter_keeps_the_tree_intact() {
        struct PanicsOnSuiteEnd;
        impl Reporter for PanicsOnSuiteEnd {
            fn on_suite_end(&mut self, _suite: &Suite) -> anyhow::Result<()> {
                panic!("reporter bug")
            }
        }

        let (mut agg, recorder) = recording();
        agg.register(PanicsOnSuiteEnd);
        agg.run_start().unwrap();
        agg.suite_start("s").unwrap();
        pass(&mut agg, "t", 1.0);
        agg.suite_end().unwrap();
        agg.run_end().unwrap();

        let run = agg.run().unwrap();
        assert_eq!(run.child_suites.len(), 1);
        assert_eq!(run.test_counts.passed, 1);
        assert_eq!(recorder.borrow().count(EventKind::RunEnd), 1);
        assert_eq!(agg.reporter_failures().len(), 1);
        assert_eq!(agg.reporter_failures()[0].event, EventKind::SuiteEnd);
    }
}
