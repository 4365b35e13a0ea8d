pub mod recorder;
pub mod tap;

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::aggregator::{Event, EventKind};
use crate::models::{Suite, Test};

pub use recorder::{RecordedEvent, Recorder, Snapshot};
pub use tap::TapReporter;

/// Consumer of the canonical event stream.
///
/// Every handler defaults to a no-op, so a reporter only implements the kinds
/// it cares about. Handlers run synchronously in registration order and only
/// ever see shared references to the tree.
pub trait Reporter {
    /// Name used when logging this reporter's failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_run_start(&mut self, _run: &Suite) -> Result<()> {
        Ok(())
    }

    fn on_suite_start(&mut self, _suite: &Suite) -> Result<()> {
        Ok(())
    }

    fn on_test_start(&mut self, _test: &Test) -> Result<()> {
        Ok(())
    }

    fn on_test_end(&mut self, _test: &Test) -> Result<()> {
        Ok(())
    }

    fn on_suite_end(&mut self, _suite: &Suite) -> Result<()> {
        Ok(())
    }

    fn on_run_end(&mut self, _run: &Suite) -> Result<()> {
        Ok(())
    }
}

/// Lets a caller keep a handle on a reporter after handing it to an aggregator.
impl<R: Reporter + ?Sized> Reporter for Rc<RefCell<R>> {
    fn name(&self) -> &str {
        "shared reporter"
    }

    fn on_run_start(&mut self, run: &Suite) -> Result<()> {
        borrow(self)?.on_run_start(run)
    }

    fn on_suite_start(&mut self, suite: &Suite) -> Result<()> {
        borrow(self)?.on_suite_start(suite)
    }

    fn on_test_start(&mut self, test: &Test) -> Result<()> {
        borrow(self)?.on_test_start(test)
    }

    fn on_test_end(&mut self, test: &Test) -> Result<()> {
        borrow(self)?.on_test_end(test)
    }

    fn on_suite_end(&mut self, suite: &Suite) -> Result<()> {
        borrow(self)?.on_suite_end(suite)
    }

    fn on_run_end(&mut self, run: &Suite) -> Result<()> {
        borrow(self)?.on_run_end(run)
    }
}

fn borrow<R: ?Sized>(shared: &Rc<RefCell<R>>) -> Result<std::cell::RefMut<'_, R>> {
    shared
        .try_borrow_mut()
        .map_err(|_| anyhow!("reporter is already borrowed"))
}

/// A handler error caught during delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ReporterFailure {
    pub reporter: String,
    pub event: EventKind,
    pub message: String,
}

/// Ordered reporter registrations plus the failures they produced.
#[derive(Default)]
pub struct Registry {
    reporters: Vec<Box<dyn Reporter>>,
    failures: Vec<ReporterFailure>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    pub fn failures(&self) -> &[ReporterFailure] {
        &self.failures
    }

    /// Deliver `event` to every reporter in registration order.
    ///
    /// A failing or panicking reporter is logged and recorded; delivery to the
    /// rest continues.
    pub fn publish(&mut self, event: Event<'_>) {
        for reporter in &mut self.reporters {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| deliver(reporter.as_mut(), event)))
                    .unwrap_or_else(|payload| {
                        Err(anyhow!("panicked: {}", panic_message(&*payload)))
                    });
            if let Err(e) = delivered {
                let failure = ReporterFailure {
                    reporter: reporter.name().to_string(),
                    event: event.kind(),
                    message: format!("{:#}", e),
                };
                tracing::warn!(
                    reporter = %failure.reporter,
                    event = %failure.event,
                    error = %failure.message,
                    "reporter failed"
                );
                self.failures.push(failure);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn deliver(reporter: &mut dyn Reporter, event: Event<'_>) -> Result<()> {
    match event {
        Event::RunStart(run) => reporter.on_run_start(run),
        Event::SuiteStart(suite) => reporter.on_suite_start(suite),
        Event::TestStart(test) => reporter.on_test_start(test),
        Event::TestEnd(test) => reporter.on_test_end(test),
        Event::SuiteEnd(suite) => reporter.on_suite_end(suite),
        Event::RunEnd(run) => reporter.on_run_end(run),
    }
}
