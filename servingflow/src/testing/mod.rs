//! Testing utilities for servingflow pipelines.
//!
//! This module provides:
//! - Mock models (echo, recording, failing, federated, gated)
//! - Registries and graph resolvers preloaded for tests
//! - Blob map builders

mod fixtures;
mod mocks;

pub use fixtures::{
    json_pipeline_blobs, pipeline_blobs, pipeline_definition_blob, recording_registry,
    test_registry, StaticGraphResolver,
};
pub use mocks::{
    EchoModel, FailingInitModel, FailingPredictModel, FederatedModel, Gate, GatedModel,
    InputRecorder, RecordingModel,
};
