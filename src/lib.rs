//! Canonical test-run events and reporters.
//!
//! Adapters translate a test framework's native callbacks into six ordered
//! intake calls on an [`Aggregator`], which builds the suite tree, rolls
//! status and counts up at each suite end, and hands every event to the
//! registered [`Reporter`]s, such as the [`TapReporter`].

pub mod adapter;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod reporter;
pub mod source;

pub use adapter::{Adapter, NdjsonAdapter};
pub use aggregator::{Aggregator, Event, EventKind};
pub use error::{AdapterError, ProtocolError};
pub use models::{Payload, Suite, Test, TestCounts, TestError, TestStatus};
pub use reporter::{Recorder, Reporter, ReporterFailure, TapReporter};
