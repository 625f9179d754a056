//! Request scheduling.
//!
//! The pool is a value built at start-up and shared by `Arc`, never a
//! process-wide static.

mod config;
mod metrics;
mod pool;

pub use config::WorkerPoolConfig;
pub use metrics::WorkerPoolMetrics;
pub use pool::WorkerPool;
