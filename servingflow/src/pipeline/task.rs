//! The engine facade exposed to the RPC boundary.

use super::executor::{PipelineExecutor, PipelineOutcome};
use super::plan::{ExecutionPlan, PlanBuilder};
use super::resolver::GraphResolver;
use crate::context::ExecutionContext;
use crate::core::{BlobMap, DataMap, FederatedParams};
use crate::errors::{PlanError, ServingError};
use crate::models::{Model, ModelRegistry, StageLoader};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// A servable pipeline: builds plans from blob maps and runs requests on
/// the currently installed one.
///
/// The installed plan is published atomically. A request loads the plan
/// once when it starts and finishes on it even if a reload lands meanwhile.
pub struct PipelineTask {
    builder: PlanBuilder,
    executor: PipelineExecutor,
    plan: ArcSwapOption<ExecutionPlan>,
}

impl PipelineTask {
    /// Creates a task with no plan installed.
    #[must_use]
    pub fn new(builder: PlanBuilder) -> Self {
        Self {
            builder,
            executor: PipelineExecutor::new(),
            plan: ArcSwapOption::empty(),
        }
    }

    /// Creates a task from a registry and a resolver.
    #[must_use]
    pub fn with_registry(registry: Arc<ModelRegistry>, resolver: Arc<dyn GraphResolver>) -> Self {
        Self::new(PlanBuilder::new(StageLoader::new(registry), resolver))
    }

    /// Builds a plan from the blob map and installs it.
    ///
    /// On error nothing is installed and the previous plan, if any, stays
    /// in service.
    ///
    /// # Errors
    ///
    /// Returns a `PlanError` if the plan cannot be built.
    pub fn init_model(&self, blobs: BlobMap) -> Result<(), PlanError> {
        let plan = self.builder.build(blobs).map_err(|err| {
            tracing::error!(
                error = %err,
                kept_previous = self.is_loaded(),
                "Failed to build pipeline plan"
            );
            err
        })?;

        let fingerprint = plan.fingerprint().to_string();
        let previous = self.plan.swap(Some(Arc::new(plan)));

        tracing::info!(
            fingerprint = %fingerprint,
            replaced = ?previous.as_ref().map(|p| p.fingerprint().to_string()),
            "Installed pipeline plan"
        );
        Ok(())
    }

    /// Runs one request on the installed plan.
    ///
    /// # Errors
    ///
    /// Returns `ServingError::NotLoaded` if no plan is installed, or the
    /// executor's error if a stage fails.
    pub async fn predict(
        &self,
        ctx: &mut ExecutionContext,
        input: DataMap,
        params: &FederatedParams,
    ) -> Result<PipelineOutcome, ServingError> {
        let plan = self.plan.load_full().ok_or(ServingError::NotLoaded)?;
        self.executor.execute(&plan, ctx, input, params).await
    }

    /// Returns the loaded model of a component in the installed plan.
    #[must_use]
    pub fn get_model_by_component_name(&self, component: &str) -> Option<Arc<dyn Model>> {
        self.plan
            .load_full()
            .and_then(|plan| plan.model_by_component(component))
    }

    /// Accumulates the weight keys of every loaded stage into the context.
    ///
    /// Placeholders contribute nothing. Without an installed plan the
    /// context is left untouched.
    pub fn collect_expected_weight_keys(&self, ctx: &mut ExecutionContext) {
        let guard = self.plan.load();
        let Some(plan) = &*guard else {
            return;
        };

        let keys: Vec<String> = plan
            .loaded_models()
            .flat_map(|(_, model)| model.weight_keys())
            .collect();
        tracing::debug!(request_id = %ctx.request_id(), keys = keys.len(), "Collected expected weight keys");
        ctx.extend_expected_weight_keys(keys);
    }

    /// Returns the installed plan.
    #[must_use]
    pub fn plan(&self) -> Option<Arc<ExecutionPlan>> {
        self.plan.load_full()
    }

    /// Returns true once a plan has been installed.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.plan.load().is_some()
    }
}

impl std::fmt::Debug for PipelineTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plan = self.plan.load_full();
        f.debug_struct("PipelineTask")
            .field("builder", &self.builder)
            .field("fingerprint", &plan.as_ref().map(|p| p.fingerprint().to_string()))
            .field("stages", &plan.as_ref().map(|p| p.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ResolvedGraph;
    use crate::testing::{pipeline_blobs, test_registry, StaticGraphResolver};

    fn task(graph: ResolvedGraph) -> PipelineTask {
        PipelineTask::with_registry(
            Arc::new(test_registry()),
            Arc::new(StaticGraphResolver::new(graph)),
        )
    }

    #[tokio::test]
    async fn test_predict_before_init_is_not_loaded() {
        let task = task(ResolvedGraph::new());
        let mut ctx = ExecutionContext::new();

        let err = task
            .predict(&mut ctx, DataMap::new(), &FederatedParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServingError::NotLoaded));
        assert!(!task.is_loaded());
    }

    #[test]
    fn test_init_model_installs_plan() {
        let task = task(ResolvedGraph::new().component("a", "Echo", [-1]));
        task.init_model(pipeline_blobs(&["a"])).unwrap();

        assert!(task.is_loaded());
        assert!(task.get_model_by_component_name("a").is_some());
        assert!(task.get_model_by_component_name("zzz").is_none());
    }

    #[test]
    fn test_failed_reload_keeps_previous_plan() {
        let task = task(ResolvedGraph::new().component("a", "Echo", [-1]));
        task.init_model(pipeline_blobs(&["a"])).unwrap();
        let before = task.plan().unwrap();

        assert!(task.init_model(BlobMap::new()).is_err());

        let after = task.plan().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_placeholder_has_no_model() {
        let task = task(ResolvedGraph::new().component("a", "Broken", [-1]));
        task.init_model(pipeline_blobs(&["a"])).unwrap();

        assert!(task.get_model_by_component_name("a").is_none());
    }

    #[test]
    fn test_collect_expected_weight_keys() {
        let graph = ResolvedGraph::new()
            .component("a", "Weighted", [-1])
            .component("b", "Broken", [0])
            .component("c", "Weighted", [0]);
        let task = task(graph);

        let mut ctx = ExecutionContext::new();
        task.collect_expected_weight_keys(&mut ctx);
        assert!(ctx.expected_weight_keys().is_none());

        task.init_model(pipeline_blobs(&["a", "b", "c"])).unwrap();
        task.collect_expected_weight_keys(&mut ctx);

        assert_eq!(ctx.expected_weight_keys().unwrap().len(), 2);
    }

    #[test]
    fn test_debug_shows_fingerprint() {
        let task = task(ResolvedGraph::new());
        assert!(format!("{task:?}").contains("fingerprint: None"));
    }
}
