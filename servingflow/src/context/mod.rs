//! Request-scoped execution state.
//!
//! One [`ExecutionContext`] is created per inbound request and discarded once
//! the response is produced. It is never shared across requests.

mod execution;

pub use execution::ExecutionContext;
