use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{Adapter, normalize_status};
use crate::aggregator::Aggregator;
use crate::error::AdapterError;
use crate::models::{Payload, TestError};

// --- NDJSON deserialization types ---

/// One line of the raw event stream, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RawEvent {
    RunStart,
    SuiteStart {
        name: String,
    },
    TestStart {
        name: String,
    },
    TestEnd {
        status: String,
        #[serde(default)]
        runtime: Option<f64>,
        #[serde(default)]
        errors: Vec<RawError>,
    },
    SuiteEnd,
    RunEnd,
}

/// A framework failure object as the emitting side serialized it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub actual: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub expected: Option<Value>,
    /// `actual`/`expected` names that exist on the native object but hold
    /// `undefined`, which JSON cannot carry.
    #[serde(default)]
    pub undefined_fields: Vec<String>,
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only a missing key is `None`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl RawError {
    fn payload(&self, field: &str, value: Option<Value>) -> Option<Payload> {
        if self.undefined_fields.iter().any(|f| f == field) {
            return Some(Payload::Undefined);
        }
        value.map(Payload::Value)
    }

    pub fn into_test_error(self) -> TestError {
        let actual = self.payload("actual", self.actual.clone());
        let expected = self.payload("expected", self.expected.clone());
        let mut error = TestError::from_message(self.message);
        error.stack = self.stack;
        error.actual = actual;
        error.expected = expected;
        error
    }
}

/// Adapter for newline-delimited JSON emitted by a reporter plugin running
/// inside the wrapped framework.
#[derive(Debug, Default)]
pub struct NdjsonAdapter {
    skipped_lines: usize,
}

impl NdjsonAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that were not JSON objects and were passed over.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Parse one line of output and feed it if it is an event.
    ///
    /// Blank lines and non-object output (banners, console noise) are skipped;
    /// a JSON object that is not a valid event is an error.
    pub fn feed_line(&mut self, line: &str, aggregator: &mut Aggregator) -> Result<(), AdapterError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let value = match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                tracing::debug!(%line, "skipping non-event output");
                self.skipped_lines += 1;
                return Ok(());
            }
        };

        let event = RawEvent::deserialize(value)?;
        self.feed(event, aggregator)
    }
}

impl Adapter for NdjsonAdapter {
    type Event = RawEvent;

    fn name(&self) -> &str {
        "NDJSON"
    }

    fn feed(&mut self, event: RawEvent, aggregator: &mut Aggregator) -> Result<(), AdapterError> {
        match event {
            RawEvent::RunStart => aggregator.run_start()?,
            RawEvent::SuiteStart { name } => aggregator.suite_start(name)?,
            RawEvent::TestStart { name } => aggregator.test_start(name)?,
            RawEvent::TestEnd {
                status,
                runtime,
                errors,
            } => {
                let status = normalize_status(&status)?;
                let errors = if status.allows_errors() {
                    errors.into_iter().map(RawError::into_test_error).collect()
                } else {
                    if !errors.is_empty() {
                        tracing::debug!(%status, dropped = errors.len(), "dropping errors");
                    }
                    Vec::new()
                };
                aggregator.test_end(status, runtime, errors)?;
            }
            RawEvent::SuiteEnd => aggregator.suite_end()?,
            RawEvent::RunEnd => aggregator.run_end()?,
        }
        Ok(())
    }
}
