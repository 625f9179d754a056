//! Proxy timeouts.

use super::CallMethod;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the [`super::InferenceProxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Wait for a synchronous `inference` call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub inference_timeout_ms: u64,
    /// Wait for `startInferenceJob` and `getInferenceResult`, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub async_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    3000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            inference_timeout_ms: default_timeout_ms(),
            async_timeout_ms: default_timeout_ms(),
        }
    }
}

impl ProxyConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the JSON is malformed or a timeout is zero.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::new("proxy", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the synchronous call timeout.
    #[must_use]
    pub fn with_inference_timeout_ms(mut self, ms: u64) -> Self {
        self.inference_timeout_ms = ms;
        self
    }

    /// Sets the asynchronous call timeout.
    #[must_use]
    pub fn with_async_timeout_ms(mut self, ms: u64) -> Self {
        self.async_timeout_ms = ms;
        self
    }

    /// Returns the timeout applied to a call method.
    #[must_use]
    pub fn timeout_for(&self, method: CallMethod) -> Duration {
        let ms = match method {
            CallMethod::Inference => self.inference_timeout_ms,
            CallMethod::GetInferenceResult | CallMethod::StartInferenceJob => self.async_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inference_timeout_ms == 0 {
            return Err(ConfigError::new("inference_timeout_ms", "must be positive"));
        }
        if self.async_timeout_ms == 0 {
            return Err(ConfigError::new("async_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}
