//! # Servingflow
//!
//! A pipeline graph executor for federated model inference serving.
//!
//! A pipeline is a list of model stages wired together by upstream indices.
//! Servingflow builds an immutable execution plan from a map of serialized
//! blobs, runs requests through it, and swaps in a new plan on reload without
//! disturbing requests already in flight.
//!
//! - **Model registry**: Implementations registered by identifier
//! - **Plan building**: Stages that fail to load become pass-through placeholders
//! - **Execution**: Stages run in order, fed by their upstream outputs
//! - **Worker pool**: Bounded scheduling that drops work when saturated
//! - **Proxy**: Routed, timed forwarding of inference calls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use servingflow::prelude::*;
//!
//! let registry = ModelRegistry::new();
//! registry.register_default::<MyScorer>("Scorer");
//!
//! let task = PipelineTask::with_registry(Arc::new(registry), Arc::new(JsonGraphResolver));
//! task.init_model(load_blob_bundle("model.json")?)?;
//!
//! let mut ctx = ExecutionContext::new().with_case_id("case-1");
//! let outcome = task.predict(&mut ctx, input, &params).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod core;
pub mod errors;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod testing;
pub mod worker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::ExecutionContext;
    pub use crate::core::{BlobMap, DataMap, FederatedParams, FederatedParty, ReturnResult};
    pub use crate::errors::{
        ConfigError, ModelError, PlanError, ProxyError, ServingError, StageLoadError,
    };
    pub use crate::models::{Model, ModelRegistry, StageLoader};
    pub use crate::observability::{init_tracing, LogConfig};
    pub use crate::pipeline::{
        load_blob_bundle, ExecutionPlan, GraphResolver, JsonGraphResolver, PipelineExecutor,
        PipelineOutcome, PipelineTask, PlanBuilder, ResolvedGraph,
    };
    pub use crate::proxy::{
        CallMethod, ChannelPool, InboundRequest, InferenceProxy, LocalChannel, ProxyConfig,
        RouterInfo, ServingChannel, StaticChannelPool,
    };
    pub use crate::worker::{WorkerPool, WorkerPoolConfig};
}
