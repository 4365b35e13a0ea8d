use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Suite, Test};

/// The six canonical event kinds every reporter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    RunStart,
    SuiteStart,
    TestStart,
    TestEnd,
    SuiteEnd,
    RunEnd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStart => "runStart",
            EventKind::SuiteStart => "suiteStart",
            EventKind::TestStart => "testStart",
            EventKind::TestEnd => "testEnd",
            EventKind::SuiteEnd => "suiteEnd",
            EventKind::RunEnd => "runEnd",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical event borrowing the node it describes.
///
/// Start events carry the node as allocated (no status yet); end events carry
/// it after finalization.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    RunStart(&'a Suite),
    SuiteStart(&'a Suite),
    TestStart(&'a Test),
    TestEnd(&'a Test),
    SuiteEnd(&'a Suite),
    RunEnd(&'a Suite),
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::RunStart(_) => EventKind::RunStart,
            Event::SuiteStart(_) => EventKind::SuiteStart,
            Event::TestStart(_) => EventKind::TestStart,
            Event::TestEnd(_) => EventKind::TestEnd,
            Event::SuiteEnd(_) => EventKind::SuiteEnd,
            Event::RunEnd(_) => EventKind::RunEnd,
        }
    }
}
