//! Pipeline planning and execution.
//!
//! This module provides:
//! - Blob key remapping and the pipeline definition blob
//! - The graph resolver interface
//! - Execution plans with placeholder substitution
//! - The per-request executor and the `PipelineTask` facade

mod blobs;
mod executor;
mod plan;
mod resolver;
mod task;

pub use blobs::{
    blob_fingerprint, blob_map_from_json, blob_map_to_json, canonical_blob_key,
    load_blob_bundle, remap_blob_keys, PipelineDefinition,
};
pub use executor::{PipelineExecutor, PipelineOutcome, StageRecord, StageRecordKind};
pub use plan::{ExecutionPlan, PlanBuilder, PlanEntry, PlanStage};
pub use resolver::{GraphResolver, JsonGraphResolver, ResolvedGraph};
pub use task::PipelineTask;
