//! Error types for the servingflow engine.
//!
//! Plan-level and call-routing failures surface to the caller as typed
//! errors. Stage-level load failures are recovered into placeholders by the
//! plan builder and only ever reach the logs.

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for servingflow operations.
#[derive(Debug, Error)]
pub enum ServingError {
    /// Building the execution plan failed.
    #[error("{0}")]
    Plan(#[from] PlanError),

    /// No plan has been installed yet.
    #[error("Pipeline not loaded: init_model has not completed successfully")]
    NotLoaded,

    /// A loaded stage failed while predicting.
    #[error("Stage '{component}' failed during predict: {source}")]
    StageExecution {
        /// The component name.
        component: String,
        /// The model error.
        #[source]
        source: ModelError,
    },

    /// A call across the RPC boundary failed.
    #[error("{0}")]
    Proxy(#[from] ProxyError),

    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServingError {
    /// Creates a stage execution error.
    #[must_use]
    pub fn stage_execution(component: impl Into<String>, source: ModelError) -> Self {
        Self::StageExecution {
            component: component.into(),
            source,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = match self {
            Self::Plan(err) => err.to_dict(),
            Self::Proxy(err) => err.to_dict(),
            Self::NotLoaded => {
                let mut map = HashMap::new();
                map.insert("type".to_string(), serde_json::json!("NotLoaded"));
                map
            }
            Self::StageExecution { component, .. } => {
                let mut map = HashMap::new();
                map.insert("type".to_string(), serde_json::json!("StageExecution"));
                map.insert("component".to_string(), serde_json::json!(component));
                map
            }
            Self::Config(err) => {
                let mut map = HashMap::new();
                map.insert("type".to_string(), serde_json::json!("Config"));
                map.insert("field".to_string(), serde_json::json!(err.field));
                map
            }
            Self::Serialization(_) => {
                let mut map = HashMap::new();
                map.insert("type".to_string(), serde_json::json!("Serialization"));
                map
            }
            Self::Io(_) => {
                let mut map = HashMap::new();
                map.insert("type".to_string(), serde_json::json!("Io"));
                map
            }
        };
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for ServingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Fatal errors raised while building an execution plan.
///
/// Any of these aborts `init_model`; no partial plan is installed.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    /// The pipeline definition blob is absent from the blob map.
    #[error("Pipeline definition blob '{key}' is missing from the model blobs")]
    MissingPipelineDefinition {
        /// The sentinel key that was looked up.
        key: String,
    },

    /// The pipeline definition blob could not be decoded.
    #[error("Invalid pipeline definition: {reason}")]
    InvalidPipelineDefinition {
        /// Why decoding failed.
        reason: String,
    },

    /// The graph resolver rejected the inference DSL.
    #[error("{0}")]
    Resolver(#[from] ResolveError),

    /// A resolved upstream index does not point at an earlier stage.
    #[error("Stage '{component}' (index {index}) references invalid upstream index {upstream}")]
    InvalidUpstream {
        /// The component name.
        component: String,
        /// The component's plan index.
        index: usize,
        /// The offending upstream index.
        upstream: i64,
    },
}

impl PlanError {
    /// Creates a missing pipeline definition error.
    #[must_use]
    pub fn missing_definition(key: impl Into<String>) -> Self {
        Self::MissingPipelineDefinition { key: key.into() }
    }

    /// Creates an invalid pipeline definition error.
    #[must_use]
    pub fn invalid_definition(reason: impl Into<String>) -> Self {
        Self::InvalidPipelineDefinition {
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::MissingPipelineDefinition { key } => {
                map.insert("type".to_string(), serde_json::json!("MissingPipelineDefinition"));
                map.insert("key".to_string(), serde_json::json!(key));
            }
            Self::InvalidPipelineDefinition { reason } => {
                map.insert("type".to_string(), serde_json::json!("InvalidPipelineDefinition"));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Resolver(err) => {
                map.insert("type".to_string(), serde_json::json!("Resolver"));
                map.insert("reason".to_string(), serde_json::json!(err.message));
            }
            Self::InvalidUpstream {
                component,
                index,
                upstream,
            } => {
                map.insert("type".to_string(), serde_json::json!("InvalidUpstream"));
                map.insert("component".to_string(), serde_json::json!(component));
                map.insert("index".to_string(), serde_json::json!(index));
                map.insert("upstream".to_string(), serde_json::json!(upstream));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Error raised by a graph resolver that cannot interpret the DSL text.
#[derive(Debug, Clone, Error)]
#[error("Failed to resolve pipeline graph: {message}")]
pub struct ResolveError {
    /// The error message.
    pub message: String,
}

impl ResolveError {
    /// Creates a new resolve error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Recoverable failure to materialize one stage.
#[derive(Debug, Clone, Error)]
pub enum StageLoadError {
    /// No factory is registered for the implementation id.
    #[error("Unknown model implementation: {implementation}")]
    UnknownImplementation {
        /// The implementation id.
        implementation: String,
    },

    /// The resolver declared no implementation for the component.
    #[error("No implementation declared for component '{component}'")]
    MissingImplementation {
        /// The component name.
        component: String,
    },

    /// The factory failed to construct an instance.
    #[error("Failed to construct '{implementation}': {source}")]
    Construction {
        /// The implementation id.
        implementation: String,
        /// The model error.
        #[source]
        source: ModelError,
    },

    /// The instance rejected its meta/param blobs.
    #[error("Failed to initialize component '{component}': {source}")]
    Initialization {
        /// The component name.
        component: String,
        /// The model error.
        #[source]
        source: ModelError,
    },
}

impl StageLoadError {
    /// Creates an unknown implementation error.
    #[must_use]
    pub fn unknown(implementation: impl Into<String>) -> Self {
        Self::UnknownImplementation {
            implementation: implementation.into(),
        }
    }

    /// Short machine-readable kind, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownImplementation { .. } => "unknown_implementation",
            Self::MissingImplementation { .. } => "missing_implementation",
            Self::Construction { .. } => "construction",
            Self::Initialization { .. } => "initialization",
        }
    }
}

/// Error reported by a model implementation.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The meta or param blob could not be interpreted.
    #[error("Invalid model config: {0}")]
    InvalidConfig(String),

    /// The model returned a non-OK status code.
    #[error("Model returned status {code}: {message}")]
    Status {
        /// The status code.
        code: i32,
        /// The status message.
        message: String,
    },

    /// Prediction failed.
    #[error("Predict failed: {0}")]
    Predict(String),
}

/// Errors raised at the RPC boundary.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// No channel could be obtained for the routed party.
    #[error("No route to {host}:{port}: {reason}")]
    Unroutable {
        /// The target host.
        host: String,
        /// The target port.
        port: u16,
        /// Why routing failed.
        reason: String,
    },

    /// The call name is not one of the recognized methods.
    #[error("Unsupported call: {call_name}")]
    UnsupportedCall {
        /// The call name.
        call_name: String,
    },

    /// The remote call failed or timed out.
    #[error("No result for call '{call_name}': {reason}")]
    NoResult {
        /// The call name.
        call_name: String,
        /// Why no result was produced.
        reason: String,
    },

    /// The remote party answered with an undecodable body.
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
}

impl ProxyError {
    /// Creates an unroutable error.
    #[must_use]
    pub fn unroutable(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::Unroutable {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Creates an unsupported call error.
    #[must_use]
    pub fn unsupported(call_name: impl Into<String>) -> Self {
        Self::UnsupportedCall {
            call_name: call_name.into(),
        }
    }

    /// Creates a no result error.
    #[must_use]
    pub fn no_result(call_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoResult {
            call_name: call_name.into(),
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::Unroutable { host, port, reason } => {
                map.insert("type".to_string(), serde_json::json!("Unroutable"));
                map.insert("host".to_string(), serde_json::json!(host));
                map.insert("port".to_string(), serde_json::json!(port));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::UnsupportedCall { call_name } => {
                map.insert("type".to_string(), serde_json::json!("UnsupportedCall"));
                map.insert("call_name".to_string(), serde_json::json!(call_name));
            }
            Self::NoResult { call_name, reason } => {
                map.insert("type".to_string(), serde_json::json!("NoResult"));
                map.insert("call_name".to_string(), serde_json::json!(call_name));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::InvalidResponse(reason) => {
                map.insert("type".to_string(), serde_json::json!("InvalidResponse"));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Error raised when a configuration value is invalid.
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
