pub mod ndjson;

use crate::aggregator::Aggregator;
use crate::error::AdapterError;
use crate::models::TestStatus;

pub use ndjson::{NdjsonAdapter, RawError, RawEvent};

/// Framework-specific translator from native runner callbacks to intake calls.
///
/// An implementation must call `run_start` once before anything else, keep
/// `suite_start`/`suite_end` properly nested, end every started test before
/// its next sibling starts, and call `run_end` once after all suites closed.
pub trait Adapter {
    /// One native event as the wrapped framework reports it.
    type Event;

    /// Display name for this adapter (e.g., "NDJSON").
    fn name(&self) -> &str;

    /// Translate `event` into zero or more intake calls on `aggregator`.
    fn feed(&mut self, event: Self::Event, aggregator: &mut Aggregator)
    -> Result<(), AdapterError>;
}

/// Map a framework's status word onto the canonical status.
///
/// Frameworks disagree on "pending": Mocha and Jasmine use it for tests that
/// never ran, so it lands on Skipped together with Jasmine's excluded/disabled.
pub fn normalize_status(raw: &str) -> Result<TestStatus, AdapterError> {
    match raw.to_ascii_lowercase().as_str() {
        "passed" | "pass" => Ok(TestStatus::Passed),
        "failed" | "fail" => Ok(TestStatus::Failed),
        "skipped" | "pending" | "excluded" | "disabled" => Ok(TestStatus::Skipped),
        "todo" => Ok(TestStatus::Todo),
        _ => Err(AdapterError::UnknownStatus(raw.to_string())),
    }
}
