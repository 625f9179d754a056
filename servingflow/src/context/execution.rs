//! Mutable execution context threaded through one predict call.

use crate::core::{DataMap, ReturnResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// State owned by a single inference request.
///
/// Stages receive `&mut ExecutionContext` so a federated stage can record the
/// remote party's result, and weight-key collection can accumulate into it.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique id of this request.
    request_id: Uuid,
    /// Caller-supplied case id, if any.
    case_id: Option<String>,
    /// When the context was created.
    created_at: DateTime<Utc>,
    /// The request input as received.
    original_input: Option<Arc<DataMap>>,
    /// Result recorded by a federated stage.
    federated_result: Option<ReturnResult>,
    /// Accumulated weight keys of all loaded stages.
    expected_weight_keys: Option<Vec<String>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Creates a new context with a generated request id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            case_id: None,
            created_at: Utc::now(),
            original_input: None,
            federated_result: None,
            expected_weight_keys: None,
        }
    }

    /// Sets the case id.
    #[must_use]
    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the case id, if any.
    #[must_use]
    pub fn case_id(&self) -> Option<&str> {
        self.case_id.as_deref()
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Milliseconds elapsed since the context was created.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.created_at).num_milliseconds()
    }

    /// Returns the original request input once predict has started.
    #[must_use]
    pub fn original_input(&self) -> Option<&Arc<DataMap>> {
        self.original_input.as_ref()
    }

    pub(crate) fn set_original_input(&mut self, input: Arc<DataMap>) {
        self.original_input = Some(input);
    }

    /// Returns the federated result, if a stage recorded one.
    #[must_use]
    pub fn federated_result(&self) -> Option<&ReturnResult> {
        self.federated_result.as_ref()
    }

    /// Records the result returned by a remote party.
    pub fn set_federated_result(&mut self, result: ReturnResult) {
        self.federated_result = Some(result);
    }

    /// Returns the collected weight keys, if collection has run.
    #[must_use]
    pub fn expected_weight_keys(&self) -> Option<&[String]> {
        self.expected_weight_keys.as_deref()
    }

    /// Appends weight keys to the accumulation slot, creating it on first use.
    pub fn extend_expected_weight_keys(&mut self, keys: impl IntoIterator<Item = String>) {
        self.expected_weight_keys
            .get_or_insert_with(Vec::new)
            .extend(keys);
    }
}
