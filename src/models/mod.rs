pub mod status;
pub mod suite;

pub use status::TestStatus;
pub use suite::{Suite, TestCounts};
pub use test::{DEFAULT_ERROR_MESSAGE, Payload, Test, TestError};
