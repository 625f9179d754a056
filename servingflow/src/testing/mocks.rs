//! Mock models for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::context::ExecutionContext;
use crate::core::{DataMap, FederatedParams, ReturnResult};
use crate::errors::ModelError;
use crate::models::Model;

/// Shared log of `(label, inputs)` pairs, one per predict call.
pub type InputRecorder = Arc<Mutex<Vec<(String, Vec<DataMap>)>>>;

fn labelled_output(label: &str) -> DataMap {
    let mut output = DataMap::new();
    output.insert("stage".to_string(), serde_json::json!(label));
    output
}

/// A model that returns a copy of its first input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoModel;

#[async_trait]
impl Model for EchoModel {
    fn initialize(&mut self, _meta: Option<&[u8]>, _param: Option<&[u8]>) -> Result<(), ModelError> {
        Ok(())
    }

    async fn predict(
        &self,
        _ctx: &mut ExecutionContext,
        inputs: &[Arc<DataMap>],
        _params: &FederatedParams,
    ) -> Result<DataMap, ModelError> {
        Ok(inputs.first().map(|i| i.as_ref().clone()).unwrap_or_default())
    }
}

/// A model whose initialization always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingInitModel;

#[async_trait]
impl Model for FailingInitModel {
    fn initialize(&mut self, _meta: Option<&[u8]>, _param: Option<&[u8]>) -> Result<(), ModelError> {
        Err(ModelError::Status {
            code: 104,
            message: "model param rejected".to_string(),
        })
    }

    async fn predict(
        &self,
        _ctx: &mut ExecutionContext,
        _inputs: &[Arc<DataMap>],
        _params: &FederatedParams,
    ) -> Result<DataMap, ModelError> {
        Ok(DataMap::new())
    }
}

/// A model that loads fine but fails every predict.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingPredictModel;

#[async_trait]
impl Model for FailingPredictModel {
    fn initialize(&mut self, _meta: Option<&[u8]>, _param: Option<&[u8]>) -> Result<(), ModelError> {
        Ok(())
    }

    async fn predict(
        &self,
        _ctx: &mut ExecutionContext,
        _inputs: &[Arc<DataMap>],
        _params: &FederatedParams,
    ) -> Result<DataMap, ModelError> {
        Err(ModelError::Predict("feature vector is empty".to_string()))
    }
}

/// A model that records its inputs and answers `{"stage": label}`.
#[derive(Debug, Clone)]
pub struct RecordingModel {
    label: String,
    recorder: InputRecorder,
}

impl RecordingModel {
    /// Creates a recording model.
    #[must_use]
    pub fn new(label: impl Into<String>, recorder: InputRecorder) -> Self {
        Self {
            label: label.into(),
            recorder,
        }
    }

    /// The output a recording model with this label produces.
    #[must_use]
    pub fn output_for(label: &str) -> DataMap {
        labelled_output(label)
    }
}

#[async_trait]
impl Model for RecordingModel {
    fn initialize(&mut self, _meta: Option<&[u8]>, _param: Option<&[u8]>) -> Result<(), ModelError> {
        Ok(())
    }

    async fn predict(
        &self,
        _ctx: &mut ExecutionContext,
        inputs: &[Arc<DataMap>],
        _params: &FederatedParams,
    ) -> Result<DataMap, ModelError> {
        let recorded = inputs.iter().map(|i| i.as_ref().clone()).collect();
        self.recorder.lock().push((self.label.clone(), recorded));
        Ok(labelled_output(&self.label))
    }

    fn weight_keys(&self) -> Vec<String> {
        vec![format!("{}.weights", self.label)]
    }
}

#[derive(Debug, Default, Deserialize)]
struct FederatedMeta {
    #[serde(default)]
    retcode: i32,
}

/// A model standing in for a guest-side federated stage.
///
/// Records a remote return result on the context. The return code comes from
/// the meta blob (`{"retcode": n}`) or [`Self::with_retcode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FederatedModel {
    retcode: i32,
}

impl FederatedModel {
    /// Creates a model reporting the given return code.
    #[must_use]
    pub fn with_retcode(retcode: i32) -> Self {
        Self { retcode }
    }
}

#[async_trait]
impl Model for FederatedModel {
    fn initialize(&mut self, meta: Option<&[u8]>, _param: Option<&[u8]>) -> Result<(), ModelError> {
        if let Some(meta) = meta {
            let meta: FederatedMeta = serde_json::from_slice(meta)
                .map_err(|e| ModelError::InvalidConfig(e.to_string()))?;
            self.retcode = meta.retcode;
        }
        Ok(())
    }

    async fn predict(
        &self,
        ctx: &mut ExecutionContext,
        _inputs: &[Arc<DataMap>],
        params: &FederatedParams,
    ) -> Result<DataMap, ModelError> {
        ctx.set_federated_result(ReturnResult::new(self.retcode));

        let mut output = DataMap::new();
        output.insert("score".to_string(), serde_json::json!(0.5));
        output.insert("case_id".to_string(), serde_json::json!(params.case_id));
        Ok(output)
    }
}

/// A latch that holds gated models inside `predict` until opened.
#[derive(Debug)]
pub struct Gate {
    permits: Semaphore,
    entered: AtomicUsize,
}

impl Gate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            permits: Semaphore::new(0),
            entered: AtomicUsize::new(0),
        })
    }

    /// Lets `n` waiting predicts through.
    pub fn open(&self, n: usize) {
        self.permits.add_permits(n);
    }

    /// Number of predicts that have reached the gate.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

/// A model that blocks on a [`Gate`] before answering `{"stage": label}`.
#[derive(Debug, Clone)]
pub struct GatedModel {
    label: String,
    gate: Arc<Gate>,
}

impl GatedModel {
    /// Creates a gated model.
    #[must_use]
    pub fn new(label: impl Into<String>, gate: Arc<Gate>) -> Self {
        Self {
            label: label.into(),
            gate,
        }
    }

    /// The output a gated model with this label produces.
    #[must_use]
    pub fn output_for(label: &str) -> DataMap {
        labelled_output(label)
    }
}

#[async_trait]
impl Model for GatedModel {
    fn initialize(&mut self, _meta: Option<&[u8]>, _param: Option<&[u8]>) -> Result<(), ModelError> {
        Ok(())
    }

    async fn predict(
        &self,
        _ctx: &mut ExecutionContext,
        _inputs: &[Arc<DataMap>],
        _params: &FederatedParams,
    ) -> Result<DataMap, ModelError> {
        self.gate.entered.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .permits
            .acquire()
            .await
            .map_err(|e| ModelError::Predict(e.to_string()))?;
        Ok(labelled_output(&self.label))
    }
}
