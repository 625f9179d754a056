//! Model trait, registry and stage loading.
//!
//! Model stages are the units a pipeline is built from. Implementations are
//! registered by identifier at start-up and instantiated once per pipeline
//! load.

mod loader;
mod registry;

pub use loader::{StageDescriptor, StageLoader};
pub use registry::{ModelFactory, ModelRegistry};

use crate::context::ExecutionContext;
use crate::core::{DataMap, FederatedParams};
use crate::errors::ModelError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for model stages.
///
/// An instance is initialized once from its meta/param blobs and then shared
/// read-only across concurrent requests, so `predict` must not mutate shared
/// state. Per-request scratch data belongs in locals or in the context.
#[async_trait]
pub trait Model: Send + Sync + Debug {
    /// Initializes the model from its serialized config and parameters.
    ///
    /// Either blob may be absent from the pipeline's blob map.
    fn initialize(&mut self, meta: Option<&[u8]>, param: Option<&[u8]>) -> Result<(), ModelError>;

    /// Runs the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The request's execution context
    /// * `inputs` - Outputs of the upstream stages, in upstream-index order
    /// * `params` - The request parameters
    async fn predict(
        &self,
        ctx: &mut ExecutionContext,
        inputs: &[Arc<DataMap>],
        params: &FederatedParams,
    ) -> Result<DataMap, ModelError>;

    /// Returns the persisted weight artifacts this stage depends on.
    fn weight_keys(&self) -> Vec<String> {
        Vec::new()
    }
}
