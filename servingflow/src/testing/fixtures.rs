//! Test fixtures: registries, resolvers and blob maps.

use serde_json::json;
use std::sync::Arc;

use super::mocks::{
    EchoModel, FailingInitModel, FailingPredictModel, FederatedModel, InputRecorder,
    RecordingModel,
};
use crate::core::{BlobMap, PIPELINE_DEFINITION_KEY};
use crate::errors::ResolveError;
use crate::models::{Model, ModelRegistry};
use crate::pipeline::{GraphResolver, ResolvedGraph};

/// A resolver that ignores the DSL and always returns the same graph.
#[derive(Debug, Clone, Default)]
pub struct StaticGraphResolver {
    graph: ResolvedGraph,
}

impl StaticGraphResolver {
    /// Creates a resolver returning `graph`.
    #[must_use]
    pub fn new(graph: ResolvedGraph) -> Self {
        Self { graph }
    }
}

impl GraphResolver for StaticGraphResolver {
    fn resolve(&self, _dsl: &str) -> Result<ResolvedGraph, ResolveError> {
        Ok(self.graph.clone())
    }
}

/// A registry with the stock mock models.
///
/// | id | model |
/// |----|-------|
/// | `Echo` | [`EchoModel`] |
/// | `Broken` | [`FailingInitModel`] |
/// | `FailPredict` | [`FailingPredictModel`] |
/// | `Federated` | [`FederatedModel`] |
/// | `Weighted` | [`RecordingModel`] labelled `Weighted` |
#[must_use]
pub fn test_registry() -> ModelRegistry {
    let registry = ModelRegistry::new();
    registry.register_default::<EchoModel>("Echo");
    registry.register_default::<FailingInitModel>("Broken");
    registry.register_default::<FailingPredictModel>("FailPredict");
    registry.register_default::<FederatedModel>("Federated");
    registry.register("Weighted", || {
        Ok(Box::new(RecordingModel::new("Weighted", InputRecorder::default())) as Box<dyn Model>)
    });
    registry
}

/// [`test_registry`] plus one [`RecordingModel`] per label, registered under
/// the label and sharing `recorder`.
#[must_use]
pub fn recording_registry(recorder: &InputRecorder, labels: &[&str]) -> ModelRegistry {
    let registry = test_registry();
    for label in labels {
        let label = (*label).to_string();
        let recorder = Arc::clone(recorder);
        registry.register(label.clone(), move || {
            Ok(Box::new(RecordingModel::new(label.clone(), Arc::clone(&recorder))) as Box<dyn Model>)
        });
    }
    registry
}

/// Encodes a pipeline definition blob around `dsl`.
#[must_use]
pub fn pipeline_definition_blob(dsl: &str) -> Vec<u8> {
    json!({ "inference_dsl": dsl }).to_string().into_bytes()
}

/// A blob map with a placeholder definition and an empty meta blob per
/// component. Pair with [`StaticGraphResolver`].
#[must_use]
pub fn pipeline_blobs(components: &[&str]) -> BlobMap {
    let mut blobs = BlobMap::new();
    blobs.insert(
        PIPELINE_DEFINITION_KEY.to_string(),
        pipeline_definition_blob("static"),
    );
    for component in components {
        blobs.insert(format!("{component}.ModelMeta"), b"{}".to_vec());
    }
    blobs
}

/// A blob map whose definition carries `graph` as JSON, for use with
/// [`crate::pipeline::JsonGraphResolver`].
///
/// Meta blobs use raw `<component>.<Implementation>Meta` keys.
#[must_use]
pub fn json_pipeline_blobs(graph: &ResolvedGraph) -> BlobMap {
    let mut blobs = BlobMap::new();
    blobs.insert(
        PIPELINE_DEFINITION_KEY.to_string(),
        pipeline_definition_blob(&json!(graph).to_string()),
    );
    for component in &graph.components {
        let implementation = graph.implementation_of(component).unwrap_or("Model");
        blobs.insert(format!("{component}.{implementation}Meta"), b"{}".to_vec());
    }
    blobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{JsonGraphResolver, PipelineDefinition};

    #[test]
    fn test_json_pipeline_blobs_resolve() {
        let graph = ResolvedGraph::new()
            .component("a", "Echo", [-1])
            .component("b", "Echo", [0]);
        let blobs = json_pipeline_blobs(&graph);

        let definition = PipelineDefinition::decode(&blobs[PIPELINE_DEFINITION_KEY]).unwrap();
        assert_eq!(JsonGraphResolver.resolve(&definition.inference_dsl).unwrap(), graph);
        assert!(blobs.contains_key("a.EchoMeta"));
    }

    #[test]
    fn test_recording_registry() {
        let recorder = InputRecorder::default();
        let registry = recording_registry(&recorder, &["A", "B"]);

        assert!(registry.is_registered("A"));
        assert!(registry.is_registered("Echo"));
        assert_eq!(registry.len(), 7);
    }
}
