//! Per-request execution of a plan.

use super::plan::{ExecutionPlan, PlanEntry};
use crate::context::ExecutionContext;
use crate::core::{DataMap, FederatedParams, RET_CODE_KEY};
use crate::errors::ServingError;
use crate::observability::SpanTimer;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// How a stage's output came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRecordKind {
    /// A loaded model produced the output.
    Produced,
    /// A placeholder forwarded its first input.
    PassThrough,
}

/// The recorded output of one plan position.
#[derive(Debug, Clone)]
pub struct StageRecord {
    /// The component name.
    pub component: String,
    /// Whether the output was produced or passed through.
    pub kind: StageRecordKind,
    /// The output visible to downstream stages.
    pub output: Arc<DataMap>,
    /// Wall time spent in the stage.
    pub duration_ms: f64,
}

/// Everything a single predict call produced.
///
/// The caller's input map is never written to; the federated return code is
/// carried here and only merged into the response by [`Self::into_response`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// The last produced output, or empty if no stage produced one.
    pub result: DataMap,
    /// Index-aligned per-stage records.
    pub stages: Vec<StageRecord>,
    /// Return code recorded by a federated stage.
    pub ret_code: Option<i32>,
}

impl PipelineOutcome {
    /// Iterates over records of stages that actually produced output.
    pub fn produced(&self) -> impl Iterator<Item = &StageRecord> {
        self.stages
            .iter()
            .filter(|r| r.kind == StageRecordKind::Produced)
    }

    /// Returns the record of a component.
    #[must_use]
    pub fn stage(&self, component: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.component == component)
    }

    /// Builds the response map sent back across the RPC boundary.
    #[must_use]
    pub fn into_response(self) -> DataMap {
        let mut response = self.result;
        if let Some(code) = self.ret_code {
            response.insert(RET_CODE_KEY.to_string(), serde_json::json!(code));
        }
        response
    }

    /// Converts to a dictionary summary for structured logging.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let stages: Vec<serde_json::Value> = self
            .stages
            .iter()
            .map(|r| {
                serde_json::json!({
                    "component": r.component,
                    "kind": r.kind,
                    "duration_ms": r.duration_ms,
                })
            })
            .collect();

        let mut map = HashMap::new();
        map.insert("stages".to_string(), serde_json::json!(stages));
        map.insert("result_keys".to_string(), serde_json::json!(self.result.keys().collect::<Vec<_>>()));
        map.insert("ret_code".to_string(), serde_json::json!(self.ret_code));
        map
    }
}

/// Runs execution plans.
///
/// Stages run strictly in plan order on the calling task. Concurrency comes
/// from running many requests at once, never from within one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Executes a plan for one request.
    ///
    /// # Errors
    ///
    /// Returns `ServingError::StageExecution` if a loaded stage fails to
    /// predict. Placeholders never fail.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        ctx: &mut ExecutionContext,
        input: DataMap,
        params: &FederatedParams,
    ) -> Result<PipelineOutcome, ServingError> {
        let timer = SpanTimer::start("pipeline");
        let input = Arc::new(input);
        ctx.set_original_input(Arc::clone(&input));

        let mut outputs: Vec<Arc<DataMap>> = Vec::with_capacity(plan.len());
        let mut records = Vec::with_capacity(plan.len());
        let mut last_produced: Option<Arc<DataMap>> = None;

        for stage in plan.stages() {
            let inputs = gather_inputs(&stage.upstream, &input, &outputs);
            let stage_timer = SpanTimer::start(stage.component.as_str());

            let (kind, output) = match &stage.entry {
                PlanEntry::Loaded(model) => {
                    let output = model.predict(ctx, &inputs, params).await.map_err(|err| {
                        tracing::warn!(
                            request_id = %ctx.request_id(),
                            component = %stage.component,
                            error = %err,
                            "Stage predict failed"
                        );
                        ServingError::stage_execution(stage.component.as_str(), err)
                    })?;
                    let output = Arc::new(output);
                    last_produced = Some(Arc::clone(&output));
                    (StageRecordKind::Produced, output)
                }
                PlanEntry::Placeholder => {
                    let output = inputs.first().map_or_else(|| Arc::clone(&input), Arc::clone);
                    (StageRecordKind::PassThrough, output)
                }
            };

            let duration_ms = stage_timer.finish();
            tracing::debug!(
                request_id = %ctx.request_id(),
                component = %stage.component,
                kind = ?kind,
                inputs = inputs.len(),
                duration_ms,
                "Stage finished"
            );

            outputs.push(Arc::clone(&output));
            records.push(StageRecord {
                component: stage.component.clone(),
                kind,
                output,
                duration_ms,
            });
        }

        let outcome = PipelineOutcome {
            result: last_produced.map(|o| o.as_ref().clone()).unwrap_or_default(),
            stages: records,
            ret_code: ctx.federated_result().map(|r| r.retcode),
        };
        let duration_ms = timer.finish();

        tracing::info!(
            request_id = %ctx.request_id(),
            case_id = ?ctx.case_id(),
            stages = outcome.stages.len(),
            produced = outcome.produced().count(),
            ret_code = ?outcome.ret_code,
            duration_ms,
            "Pipeline predict finished"
        );

        Ok(outcome)
    }
}

/// Resolves a stage's upstream set into concrete inputs.
///
/// An empty set reads the request input. Sets iterate in ascending order, so
/// the request input (`-1`) always comes first. Plans only ever hold `-1` as
/// a negative index.
fn gather_inputs(
    upstream: &BTreeSet<i64>,
    input: &Arc<DataMap>,
    outputs: &[Arc<DataMap>],
) -> Vec<Arc<DataMap>> {
    if upstream.is_empty() {
        return vec![Arc::clone(input)];
    }

    upstream
        .iter()
        .map(|&up| match usize::try_from(up) {
            Ok(j) => Arc::clone(&outputs[j]),
            Err(_) => Arc::clone(input),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Model;
    use crate::pipeline::PlanStage;
    use crate::testing::{
        EchoModel, FailingPredictModel, FederatedModel, InputRecorder, RecordingModel,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stage(component: &str, entry: PlanEntry, upstream: &[i64]) -> PlanStage {
        PlanStage {
            component: component.to_string(),
            implementation: None,
            entry,
            upstream: upstream.iter().copied().collect(),
        }
    }

    fn recording(label: &str, recorder: &InputRecorder) -> PlanEntry {
        let model: Arc<dyn Model> = Arc::new(RecordingModel::new(label, Arc::clone(recorder)));
        PlanEntry::Loaded(model)
    }

    fn request() -> DataMap {
        let mut input = DataMap::new();
        input.insert("x".to_string(), json!(1));
        input
    }

    async fn run(plan: &ExecutionPlan, input: DataMap) -> (ExecutionContext, PipelineOutcome) {
        let mut ctx = ExecutionContext::new();
        let outcome = PipelineExecutor::new()
            .execute(plan, &mut ctx, input, &FederatedParams::new("case"))
            .await
            .unwrap();
        (ctx, outcome)
    }

    #[tokio::test]
    async fn test_chain_feeds_upstream_outputs() {
        let recorder = InputRecorder::default();
        let plan = ExecutionPlan::new(
            vec![
                stage("a", recording("A", &recorder), &[-1]),
                stage("b", recording("B", &recorder), &[0]),
                stage("c", recording("C", &recorder), &[0, 1]),
            ],
            "fp",
        );

        let (_, outcome) = run(&plan, request()).await;

        assert_eq!(outcome.result, RecordingModel::output_for("C"));
        let calls = recorder.lock();
        assert_eq!(calls[0].1, vec![request()]);
        assert_eq!(calls[2].0, "C");
        assert_eq!(
            calls[2].1,
            vec![RecordingModel::output_for("A"), RecordingModel::output_for("B")]
        );
    }

    #[tokio::test]
    async fn test_placeholder_passes_first_input_through() {
        let recorder = InputRecorder::default();
        let plan = ExecutionPlan::new(
            vec![
                stage("a", recording("A", &recorder), &[-1]),
                stage("b", PlanEntry::Placeholder, &[0]),
                stage("c", recording("C", &recorder), &[0, 1]),
            ],
            "fp",
        );

        let (_, outcome) = run(&plan, request()).await;

        let calls = recorder.lock();
        assert_eq!(calls[1].1[1], RecordingModel::output_for("A"));
        assert_eq!(outcome.stage("b").unwrap().kind, StageRecordKind::PassThrough);
        assert_eq!(outcome.produced().count(), 2);
    }

    #[tokio::test]
    async fn test_all_placeholders_yield_empty_result() {
        let plan = ExecutionPlan::new(
            vec![
                stage("a", PlanEntry::Placeholder, &[-1]),
                stage("b", PlanEntry::Placeholder, &[0]),
            ],
            "fp",
        );

        let (_, outcome) = run(&plan, request()).await;

        assert!(outcome.result.is_empty());
        assert_eq!(outcome.stages.len(), 2);
        assert_eq!(outcome.stages[1].output.as_ref(), &request());
    }

    #[tokio::test]
    async fn test_result_is_last_produced_not_last_stage() {
        let recorder = InputRecorder::default();
        let plan = ExecutionPlan::new(
            vec![
                stage("a", recording("A", &recorder), &[-1]),
                stage("b", PlanEntry::Placeholder, &[-1]),
            ],
            "fp",
        );

        let (_, outcome) = run(&plan, request()).await;
        assert_eq!(outcome.result, RecordingModel::output_for("A"));
    }

    #[tokio::test]
    async fn test_empty_upstream_reads_request_input() {
        let recorder = InputRecorder::default();
        let plan = ExecutionPlan::new(
            vec![
                stage("a", recording("A", &recorder), &[-1]),
                stage("b", recording("B", &recorder), &[]),
            ],
            "fp",
        );

        run(&plan, request()).await;
        assert_eq!(recorder.lock()[1].1, vec![request()]);
    }

    #[tokio::test]
    async fn test_request_input_comes_first() {
        let recorder = InputRecorder::default();
        let plan = ExecutionPlan::new(
            vec![
                stage("a", recording("A", &recorder), &[-1]),
                stage("b", recording("B", &recorder), &[0, -1]),
            ],
            "fp",
        );

        run(&plan, request()).await;
        assert_eq!(
            recorder.lock()[1].1,
            vec![request(), RecordingModel::output_for("A")]
        );
    }

    #[tokio::test]
    async fn test_federated_ret_code_goes_to_outcome() {
        let plan = ExecutionPlan::new(
            vec![stage(
                "fed",
                PlanEntry::Loaded(Arc::new(FederatedModel::with_retcode(104))),
                &[-1],
            )],
            "fp",
        );

        let (ctx, outcome) = run(&plan, request()).await;

        assert_eq!(outcome.ret_code, Some(104));
        assert!(!outcome.result.contains_key(RET_CODE_KEY));
        assert_eq!(ctx.original_input().unwrap().as_ref(), &request());

        let response = outcome.into_response();
        assert_eq!(response.get(RET_CODE_KEY), Some(&json!(104)));
    }

    #[tokio::test]
    async fn test_predict_error_aborts() {
        let plan = ExecutionPlan::new(
            vec![
                stage("a", PlanEntry::Loaded(Arc::new(EchoModel)), &[-1]),
                stage("b", PlanEntry::Loaded(Arc::new(FailingPredictModel)), &[0]),
            ],
            "fp",
        );

        let mut ctx = ExecutionContext::new();
        let err = PipelineExecutor::new()
            .execute(&plan, &mut ctx, request(), &FederatedParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServingError::StageExecution { ref component, .. } if component == "b"));
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let plan = ExecutionPlan::new(Vec::new(), "fp");
        let (_, outcome) = run(&plan, request()).await;

        assert!(outcome.result.is_empty());
        assert!(outcome.into_response().is_empty());
    }

    #[test]
    fn test_outcome_to_dict() {
        let outcome = PipelineOutcome {
            result: DataMap::new(),
            stages: vec![StageRecord {
                component: "a".to_string(),
                kind: StageRecordKind::PassThrough,
                output: Arc::new(DataMap::new()),
                duration_ms: 0.5,
            }],
            ret_code: Some(0),
        };

        let dict = outcome.to_dict();
        assert_eq!(dict.get("ret_code").unwrap(), &json!(0));
        assert_eq!(dict.get("stages").unwrap()[0]["kind"], json!("pass_through"));
    }
}
