//! Stage construction from descriptors.

use super::{Model, ModelRegistry};
use crate::core::{BlobMap, META_KEY_SUFFIX, PARAM_KEY_SUFFIX};
use crate::errors::StageLoadError;
use std::sync::Arc;

/// Everything needed to materialize one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    /// Component name, unique within the pipeline.
    pub component_name: String,
    /// Declared implementation id.
    pub implementation: Option<String>,
    /// Serialized model configuration.
    pub meta: Option<Vec<u8>>,
    /// Serialized model parameters.
    pub param: Option<Vec<u8>>,
}

impl StageDescriptor {
    /// Creates a descriptor without blobs.
    #[must_use]
    pub fn new(component_name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            implementation: Some(implementation.into()),
            meta: None,
            param: None,
        }
    }

    /// Sets the meta blob.
    #[must_use]
    pub fn with_meta(mut self, meta: impl Into<Vec<u8>>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// Sets the param blob.
    #[must_use]
    pub fn with_param(mut self, param: impl Into<Vec<u8>>) -> Self {
        self.param = Some(param.into());
        self
    }

    /// Builds a descriptor by taking the component's blobs out of a remapped
    /// blob map.
    #[must_use]
    pub fn take_from(
        blobs: &mut BlobMap,
        component_name: &str,
        implementation: Option<&str>,
    ) -> Self {
        Self {
            component_name: component_name.to_string(),
            implementation: implementation.map(str::to_string),
            meta: blobs.remove(&format!("{component_name}.{META_KEY_SUFFIX}")),
            param: blobs.remove(&format!("{component_name}.{PARAM_KEY_SUFFIX}")),
        }
    }
}

/// Materializes model instances for pipeline stages.
#[derive(Debug, Clone)]
pub struct StageLoader {
    registry: Arc<ModelRegistry>,
}

impl StageLoader {
    /// Creates a loader over a registry.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Resolves, constructs and initializes the stage's model.
    ///
    /// # Errors
    ///
    /// Returns a `StageLoadError` when the implementation is missing or
    /// unknown, construction fails, or initialization is rejected. Callers
    /// are expected to degrade the stage rather than abort.
    pub fn load(&self, descriptor: &StageDescriptor) -> Result<Arc<dyn Model>, StageLoadError> {
        let implementation = descriptor.implementation.as_deref().ok_or_else(|| {
            StageLoadError::MissingImplementation {
                component: descriptor.component_name.clone(),
            }
        })?;

        let factory = self.registry.resolve(implementation)?;
        let mut model = factory().map_err(|source| StageLoadError::Construction {
            implementation: implementation.to_string(),
            source,
        })?;

        model
            .initialize(descriptor.meta.as_deref(), descriptor.param.as_deref())
            .map_err(|source| StageLoadError::Initialization {
                component: descriptor.component_name.clone(),
                source,
            })?;

        tracing::debug!(
            component = %descriptor.component_name,
            implementation = %implementation,
            has_meta = descriptor.meta.is_some(),
            has_param = descriptor.param.is_some(),
            "Stage initialized"
        );

        Ok(Arc::from(model))
    }
}
