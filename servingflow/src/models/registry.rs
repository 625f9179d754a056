//! Registry mapping implementation identifiers to model factories.

use super::Model;
use crate::errors::{ModelError, StageLoadError};
use dashmap::DashMap;
use std::sync::Arc;

/// Factory function type for creating model instances.
pub type ModelFactory = Arc<dyn Fn() -> Result<Box<dyn Model>, ModelError> + Send + Sync>;

/// Registry of model implementations.
///
/// The set of implementations is open: anything can register a factory under
/// a new identifier without touching the plan builder.
#[derive(Default)]
pub struct ModelRegistry {
    factories: DashMap<String, ModelFactory>,
}

impl ModelRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any previous one for the same id.
    pub fn register<F>(&self, implementation: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Model>, ModelError> + Send + Sync + 'static,
    {
        let implementation = implementation.into();
        if self
            .factories
            .insert(implementation.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::debug!(implementation = %implementation, "Replaced model factory");
        }
    }

    /// Registers a model type constructible through `Default`.
    pub fn register_default<M>(&self, implementation: impl Into<String>)
    where
        M: Model + Default + 'static,
    {
        self.register(implementation, || Ok(Box::new(M::default()) as Box<dyn Model>));
    }

    /// Resolves an implementation id to its factory.
    ///
    /// # Errors
    ///
    /// Returns `StageLoadError::UnknownImplementation` if nothing is
    /// registered under `implementation`.
    pub fn resolve(&self, implementation: &str) -> Result<ModelFactory, StageLoadError> {
        self.factories
            .get(implementation)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StageLoadError::unknown(implementation))
    }

    /// Returns true if an implementation id is registered.
    #[must_use]
    pub fn is_registered(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }

    /// Returns all registered implementation ids, sorted.
    #[must_use]
    pub fn implementation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered implementations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("implementations", &self.implementation_ids())
            .finish()
    }
}
