use thiserror::Error;

use crate::models::TestStatus;

/// An adapter broke the intake ordering contract.
///
/// Fatal for the current run: the aggregator never repairs the tree, it
/// reports the violation and leaves its state untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("runStart has not been called")]
    RunNotStarted,

    #[error("runStart called twice")]
    RunAlreadyStarted,

    #[error("run already ended")]
    RunAlreadyFinished,

    #[error("suiteEnd called with no open suite")]
    NoOpenSuite,

    #[error("testEnd called with no open test")]
    NoOpenTest,

    #[error("test '{name}' is still open")]
    TestStillOpen { name: String },

    #[error("suite '{name}' is still open")]
    SuiteStillOpen { name: String },

    #[error("runEnd called with {open} suite(s) still open")]
    SuitesStillOpen { open: usize },

    #[error("'{name}' was already finalized")]
    AlreadyFinalized { name: String },

    #[error("test '{name}' reported an invalid runtime {runtime}")]
    InvalidRuntime { name: String, runtime: f64 },

    #[error("test '{name}' ended without a runtime")]
    MissingRuntime { name: String },

    #[error("test '{name}' is {status} but carries errors")]
    UnexpectedErrors { name: String, status: TestStatus },
}

/// Failure while translating a raw framework stream into intake calls.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown test status '{0}'")]
    UnknownStatus(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
