//! Worker pool configuration.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Configuration for a [`super::WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Workers kept alive regardless of load.
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    /// Upper bound on live workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Tasks that may wait for a worker before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Idle time after which a worker above `min_workers` retires.
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,
    /// Prefix of worker names in logs.
    #[serde(default = "default_name_prefix")]
    pub thread_name_prefix: String,
}

fn host_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn default_min_workers() -> usize {
    host_parallelism()
}

fn default_max_workers() -> usize {
    host_parallelism() * 2
}

fn default_queue_capacity() -> usize {
    10
}

fn default_keep_alive_ms() -> u64 {
    60_000
}

fn default_name_prefix() -> String {
    "inference-worker".to_string()
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            keep_alive_ms: default_keep_alive_ms(),
            thread_name_prefix: default_name_prefix(),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a configuration sized for the host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the JSON is malformed or the result does
    /// not validate.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::new("worker_pool", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the minimum worker count.
    #[must_use]
    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    /// Sets the maximum worker count.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the keep-alive.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the worker name prefix.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Returns the keep-alive as a duration.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::new("max_workers", "must be at least 1"));
        }
        if self.min_workers > self.max_workers {
            return Err(ConfigError::new(
                "min_workers",
                format!(
                    "{} exceeds max_workers ({})",
                    self.min_workers, self.max_workers
                ),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::new("queue_capacity", "must be at least 1"));
        }
        Ok(())
    }
}
