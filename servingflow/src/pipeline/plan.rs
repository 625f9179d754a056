//! Execution plans and the plan builder.

use super::blobs::{blob_fingerprint, remap_blob_keys, PipelineDefinition};
use super::resolver::GraphResolver;
use crate::core::{BlobMap, PIPELINE_DEFINITION_KEY};
use crate::errors::PlanError;
use crate::models::{Model, StageDescriptor, StageLoader};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A stage's materialized implementation.
#[derive(Debug, Clone)]
pub enum PlanEntry {
    /// A model that loaded and initialized successfully.
    Loaded(Arc<dyn Model>),
    /// A stage that failed to load; passes its first input through.
    Placeholder,
}

impl PlanEntry {
    /// Returns true for a placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    /// Returns the loaded model, if any.
    #[must_use]
    pub fn model(&self) -> Option<&Arc<dyn Model>> {
        match self {
            Self::Loaded(model) => Some(model),
            Self::Placeholder => None,
        }
    }
}

/// One position of an execution plan.
#[derive(Debug, Clone)]
pub struct PlanStage {
    /// The component name.
    pub component: String,
    /// The declared implementation id.
    pub implementation: Option<String>,
    /// The materialized implementation.
    pub entry: PlanEntry,
    /// Upstream indices; `-1` is the request input. Empty means request input.
    pub upstream: BTreeSet<i64>,
}

/// The resolved, ordered pipeline.
///
/// Immutable once built. Reloading builds a fresh plan and swaps it in, so
/// in-flight requests keep the plan they started with.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    stages: Vec<PlanStage>,
    by_component: HashMap<String, usize>,
    fingerprint: String,
    built_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Creates a plan from prepared stages.
    ///
    /// Callers guarantee every upstream index is `-1` or refers to an
    /// earlier stage.
    #[must_use]
    pub(crate) fn new(stages: Vec<PlanStage>, fingerprint: impl Into<String>) -> Self {
        let by_component = stages
            .iter()
            .enumerate()
            .map(|(i, stage)| (stage.component.clone(), i))
            .collect();

        Self {
            stages,
            by_component,
            fingerprint: fingerprint.into(),
            built_at: Utc::now(),
        }
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[PlanStage] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the plan has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the number of placeholder stages.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.stages.iter().filter(|s| s.entry.is_placeholder()).count()
    }

    /// Returns the blob fingerprint this plan was built from.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns when the plan was built.
    #[must_use]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Returns the plan index of a component.
    #[must_use]
    pub fn index_of(&self, component: &str) -> Option<usize> {
        self.by_component.get(component).copied()
    }

    /// Returns the loaded model of a component.
    ///
    /// Placeholders and unknown names both yield `None`.
    #[must_use]
    pub fn model_by_component(&self, component: &str) -> Option<Arc<dyn Model>> {
        self.index_of(component)
            .and_then(|i| self.stages[i].entry.model())
            .cloned()
    }

    /// Iterates over the loaded models in plan order.
    pub fn loaded_models(&self) -> impl Iterator<Item = (&str, &Arc<dyn Model>)> {
        self.stages
            .iter()
            .filter_map(|s| s.entry.model().map(|m| (s.component.as_str(), m)))
    }
}

/// Builds execution plans from model blob maps.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    loader: StageLoader,
    resolver: Arc<dyn GraphResolver>,
}

impl PlanBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(loader: StageLoader, resolver: Arc<dyn GraphResolver>) -> Self {
        Self { loader, resolver }
    }

    /// Returns the stage loader.
    #[must_use]
    pub fn loader(&self) -> &StageLoader {
        &self.loader
    }

    /// Builds a plan.
    ///
    /// Stage load failures degrade that stage to a placeholder and are
    /// logged; they never fail the build.
    ///
    /// # Errors
    ///
    /// Returns a `PlanError` if the pipeline definition blob is missing or
    /// invalid, or the resolver rejects its DSL.
    pub fn build(&self, blobs: BlobMap) -> Result<ExecutionPlan, PlanError> {
        tracing::info!(blobs = ?blobs.keys().collect::<Vec<_>>(), "Start building pipeline plan");

        let fingerprint = blob_fingerprint(&blobs);
        let mut blobs = remap_blob_keys(blobs);
        tracing::debug!(blobs = ?blobs.keys().collect::<Vec<_>>(), "Remapped model blobs");

        let definition_blob = blobs
            .remove(PIPELINE_DEFINITION_KEY)
            .ok_or_else(|| PlanError::missing_definition(PIPELINE_DEFINITION_KEY))?;
        let definition = PipelineDefinition::decode(&definition_blob)?;

        let graph = self.resolver.resolve(&definition.inference_dsl)?;
        graph.validate()?;

        let mut stages = Vec::with_capacity(graph.len());
        for (index, component) in graph.components.iter().enumerate() {
            let implementation = graph.implementation_of(component);
            let descriptor = StageDescriptor::take_from(&mut blobs, component, implementation);

            let entry = match self.loader.load(&descriptor) {
                Ok(model) => {
                    tracing::info!(
                        component = %component,
                        implementation = ?implementation,
                        "Added stage to pipeline"
                    );
                    PlanEntry::Loaded(model)
                }
                Err(err) => {
                    tracing::warn!(
                        component = %component,
                        implementation = ?implementation,
                        kind = err.kind(),
                        error = %err,
                        "Stage failed to load, using pass-through placeholder"
                    );
                    PlanEntry::Placeholder
                }
            };

            stages.push(PlanStage {
                component: component.clone(),
                implementation: implementation.map(str::to_string),
                entry,
                upstream: graph.upstream_of(index),
            });
        }

        let plan = ExecutionPlan::new(stages, fingerprint);
        tracing::info!(
            stages = plan.len(),
            placeholders = plan.placeholder_count(),
            fingerprint = %plan.fingerprint(),
            "Finished building pipeline plan"
        );
        Ok(plan)
    }
}
