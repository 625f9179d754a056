//! A channel that serves calls against an in-process pipeline.

use super::{CallMethod, ServingChannel};
use crate::context::ExecutionContext;
use crate::core::{DataMap, FederatedParams};
use crate::errors::ProxyError;
use crate::pipeline::PipelineTask;
use crate::worker::WorkerPool;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Envelope key carrying the case id.
pub const CASE_ID_KEY: &str = "caseid";

/// The request envelope as assembled by the proxy.
#[derive(Debug, Clone, Default, Deserialize)]
struct InferenceEnvelope {
    #[serde(rename = "caseid", default)]
    case_id: String,
    #[serde(rename = "seqno", default)]
    seq_no: String,
    #[serde(rename = "featureData", default)]
    feature_data: DataMap,
    #[serde(rename = "sendToRemoteFeatureData", default)]
    feature_ids: DataMap,
    #[serde(flatten)]
    extra: DataMap,
}

impl InferenceEnvelope {
    fn decode(method: CallMethod, body: &[u8]) -> Result<Self, ProxyError> {
        serde_json::from_slice(body)
            .map_err(|e| ProxyError::no_result(method.as_str(), format!("undecodable request: {e}")))
    }

    fn into_request(self) -> (ExecutionContext, DataMap, FederatedParams) {
        let ctx = ExecutionContext::new().with_case_id(self.case_id.as_str());
        let params = FederatedParams {
            case_id: self.case_id,
            seq_no: self.seq_no,
            local: None,
            feature_ids: self.feature_ids,
            extra: self.extra,
        };
        (ctx, self.feature_data, params)
    }
}

type JobResults = DashMap<String, Result<DataMap, String>>;

/// Serves proxy calls against a local [`PipelineTask`].
///
/// `inference` runs the pipeline inline. `startInferenceJob` schedules it on
/// the worker pool under the envelope's case id, and `getInferenceResult`
/// hands back what that job stored, once: a delivered result is removed. A
/// job the pool dropped never stores anything, so its result never appears.
pub struct LocalChannel {
    task: Arc<PipelineTask>,
    pool: Option<WorkerPool>,
    results: Arc<JobResults>,
}

impl LocalChannel {
    /// Creates a channel that only serves synchronous inference.
    #[must_use]
    pub fn new(task: Arc<PipelineTask>) -> Self {
        Self {
            task,
            pool: None,
            results: Arc::new(DashMap::new()),
        }
    }

    /// Enables asynchronous jobs on the given pool.
    #[must_use]
    pub fn with_worker_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Returns the number of stored job results.
    #[must_use]
    pub fn stored_results(&self) -> usize {
        self.results.len()
    }

    async fn inference(&self, body: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let method = CallMethod::Inference;
        let (mut ctx, input, params) = InferenceEnvelope::decode(method, body)?.into_request();

        let outcome = self
            .task
            .predict(&mut ctx, input, &params)
            .await
            .map_err(|e| ProxyError::no_result(method.as_str(), e.to_string()))?;

        encode(method, &outcome.into_response())
    }

    fn start_job(&self, body: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let method = CallMethod::StartInferenceJob;
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| ProxyError::no_result(method.as_str(), "asynchronous jobs are not enabled"))?;

        let envelope = InferenceEnvelope::decode(method, body)?;
        if envelope.case_id.is_empty() {
            return Err(ProxyError::no_result(method.as_str(), "missing caseid"));
        }

        let case_id = envelope.case_id.clone();
        let task = Arc::clone(&self.task);
        let results = Arc::clone(&self.results);
        let job_case_id = case_id.clone();

        pool.submit(async move {
            let (mut ctx, input, params) = envelope.into_request();
            let stored = task
                .predict(&mut ctx, input, &params)
                .await
                .map(|outcome| outcome.into_response())
                .map_err(|e| e.to_string());
            results.insert(job_case_id, stored);
        });

        tracing::debug!(case_id = %case_id, "Inference job submitted");
        let mut ack = DataMap::new();
        ack.insert(CASE_ID_KEY.to_string(), serde_json::json!(case_id));
        encode(method, &ack)
    }

    fn job_result(&self, body: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let method = CallMethod::GetInferenceResult;
        let envelope = InferenceEnvelope::decode(method, body)?;

        let (case_id, stored) = self.results.remove(&envelope.case_id).ok_or_else(|| {
            ProxyError::no_result(
                method.as_str(),
                format!("no result for case '{}'", envelope.case_id),
            )
        })?;
        tracing::debug!(case_id = %case_id, ok = stored.is_ok(), "Inference job result delivered");

        match stored {
            Ok(response) => encode(method, &response),
            Err(reason) => Err(ProxyError::no_result(method.as_str(), reason)),
        }
    }
}

fn encode(method: CallMethod, response: &DataMap) -> Result<Vec<u8>, ProxyError> {
    serde_json::to_vec(response).map_err(|e| ProxyError::no_result(method.as_str(), e.to_string()))
}

#[async_trait]
impl ServingChannel for LocalChannel {
    async fn call(&self, method: CallMethod, body: Vec<u8>) -> Result<Vec<u8>, ProxyError> {
        match method {
            CallMethod::Inference => self.inference(&body).await,
            CallMethod::StartInferenceJob => self.start_job(&body),
            CallMethod::GetInferenceResult => self.job_result(&body),
        }
    }
}

impl fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannel")
            .field("task", &self.task)
            .field("pool", &self.pool)
            .field("stored_results", &self.results.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{JsonGraphResolver, ResolvedGraph};
    use crate::testing::{json_pipeline_blobs, test_registry};
    use crate::worker::WorkerPoolConfig;
    use serde_json::json;
    use std::time::Duration;

    fn serving_task() -> Arc<PipelineTask> {
        let task = PipelineTask::with_registry(Arc::new(test_registry()), Arc::new(JsonGraphResolver));
        let graph = ResolvedGraph::new()
            .component("fed", "Federated", [-1])
            .component("echo", "Echo", [-1]);
        task.init_model(json_pipeline_blobs(&graph)).unwrap();
        Arc::new(task)
    }

    fn envelope(case_id: &str) -> Vec<u8> {
        json!({
            "caseid": case_id,
            "seqno": "1",
            "featureData": {"age": 31},
            "serviceId": "credit-score"
        })
        .to_string()
        .into_bytes()
    }

    fn decode(body: &[u8]) -> DataMap {
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn test_envelope_splits_params() {
        let envelope = InferenceEnvelope::decode(CallMethod::Inference, &envelope("c-1")).unwrap();
        let (ctx, input, params) = envelope.into_request();

        assert_eq!(ctx.case_id(), Some("c-1"));
        assert_eq!(input.get("age"), Some(&json!(31)));
        assert_eq!(params.seq_no, "1");
        assert_eq!(params.extra.get("serviceId"), Some(&json!("credit-score")));
    }

    #[test]
    fn test_inference_inline() {
        let channel = LocalChannel::new(serving_task());
        let body = tokio_test::block_on(channel.call(CallMethod::Inference, envelope("c-1"))).unwrap();

        let response = decode(&body);
        assert_eq!(response.get("age"), Some(&json!(31)));
        assert_eq!(response.get("retcode"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_inference_before_init_fails() {
        let task = PipelineTask::with_registry(Arc::new(test_registry()), Arc::new(JsonGraphResolver));
        let channel = LocalChannel::new(Arc::new(task));

        let err = channel
            .call(CallMethod::Inference, envelope("c-1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not loaded"));
    }

    #[tokio::test]
    async fn test_start_job_requires_pool() {
        let channel = LocalChannel::new(serving_task());
        let err = channel
            .call(CallMethod::StartInferenceJob, envelope("c-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoResult { .. }));
    }

    #[tokio::test]
    async fn test_async_job_roundtrip() {
        let pool = WorkerPool::new(
            WorkerPoolConfig::new()
                .with_min_workers(1)
                .with_max_workers(2),
        )
        .unwrap();
        let channel = LocalChannel::new(serving_task()).with_worker_pool(pool.clone());

        let ack = channel
            .call(CallMethod::StartInferenceJob, envelope("job-7"))
            .await
            .unwrap();
        assert_eq!(decode(&ack).get(CASE_ID_KEY), Some(&json!("job-7")));

        tokio::time::timeout(Duration::from_secs(5), async {
            while channel.stored_results() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let body = channel
            .call(CallMethod::GetInferenceResult, envelope("job-7"))
            .await
            .unwrap();
        assert_eq!(decode(&body).get("age"), Some(&json!(31)));
        assert_eq!(channel.stored_results(), 0);

        let again = channel
            .call(CallMethod::GetInferenceResult, envelope("job-7"))
            .await;
        assert!(matches!(again, Err(ProxyError::NoResult { .. })));

        let missing = channel
            .call(CallMethod::GetInferenceResult, envelope("job-8"))
            .await;
        assert!(missing.is_err());

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_job_result_is_delivered_once() {
        let pool = WorkerPool::new(WorkerPoolConfig::new().with_min_workers(1).with_max_workers(1))
            .unwrap();
        let task = PipelineTask::with_registry(Arc::new(test_registry()), Arc::new(JsonGraphResolver));
        task.init_model(json_pipeline_blobs(
            &ResolvedGraph::new().component("bad", "FailPredict", [-1]),
        ))
        .unwrap();
        let channel = LocalChannel::new(Arc::new(task)).with_worker_pool(pool.clone());

        for case_id in ["job-1", "job-2"] {
            channel
                .call(CallMethod::StartInferenceJob, envelope(case_id))
                .await
                .unwrap();
        }
        pool.shutdown().await;
        assert_eq!(channel.stored_results(), 2);

        let err = channel
            .call(CallMethod::GetInferenceResult, envelope("job-1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed during predict"));
        assert_eq!(channel.stored_results(), 1);
    }

    #[tokio::test]
    async fn test_start_job_requires_case_id() {
        let pool = WorkerPool::new(WorkerPoolConfig::new().with_min_workers(1).with_max_workers(1))
            .unwrap();
        let channel = LocalChannel::new(serving_task()).with_worker_pool(pool.clone());

        let err = channel
            .call(CallMethod::StartInferenceJob, envelope(""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("caseid"));
        assert_eq!(pool.metrics().submitted(), 0);
    }
}
