//! The RPC boundary in front of serving endpoints.

use super::{CallMethod, ChannelPool, ProxyConfig, RouterInfo, CASE_ID_KEY};
use crate::core::DataMap;
use crate::errors::ProxyError;
use crate::observability::SpanTimer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A request arriving at the proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundRequest {
    /// Wire name of the method to invoke.
    pub call_name: String,
    /// Case id forwarded to the endpoint.
    pub case_id: String,
    /// Target endpoint.
    pub router: Option<RouterInfo>,
    /// Header fields, merged into the envelope first.
    #[serde(default)]
    pub head: DataMap,
    /// Body fields, merged after the head.
    #[serde(default)]
    pub body: DataMap,
}

impl InboundRequest {
    /// Creates a request for a call routed to `router`.
    #[must_use]
    pub fn new(call_name: impl Into<String>, case_id: impl Into<String>, router: RouterInfo) -> Self {
        Self {
            call_name: call_name.into(),
            case_id: case_id.into(),
            router: Some(router),
            head: DataMap::new(),
            body: DataMap::new(),
        }
    }

    /// Sets the header fields.
    #[must_use]
    pub fn with_head(mut self, head: DataMap) -> Self {
        self.head = head;
        self
    }

    /// Sets the body fields.
    #[must_use]
    pub fn with_body(mut self, body: DataMap) -> Self {
        self.body = body;
        self
    }

    /// Builds the JSON envelope sent to the endpoint.
    ///
    /// Body fields override head fields; `caseid` is always the request's.
    #[must_use]
    pub fn envelope(&self) -> DataMap {
        let mut envelope = DataMap::new();
        envelope.extend(self.head.iter().map(|(k, v)| (k.clone(), v.clone())));
        envelope.extend(self.body.iter().map(|(k, v)| (k.clone(), v.clone())));
        envelope.insert(CASE_ID_KEY.to_string(), serde_json::json!(self.case_id));
        envelope
    }
}

/// Forwards inbound requests to serving endpoints.
///
/// Each call goes through four steps: obtain a channel for the route, build
/// the envelope, pick the method by call name, and wait for the response
/// under that method's timeout. An unknown call name is rejected before
/// anything is sent.
pub struct InferenceProxy {
    pool: Arc<dyn ChannelPool>,
    config: ProxyConfig,
}

impl InferenceProxy {
    /// Creates a proxy with default timeouts.
    #[must_use]
    pub fn new(pool: Arc<dyn ChannelPool>) -> Self {
        Self {
            pool,
            config: ProxyConfig::default(),
        }
    }

    /// Replaces the timeout configuration.
    #[must_use]
    pub fn with_config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the timeout configuration.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Handles one request and returns the decoded response map.
    ///
    /// # Errors
    ///
    /// - `Unroutable` if the request has no route or the pool has no channel
    /// - `UnsupportedCall` for an unknown call name
    /// - `NoResult` if the call fails or exceeds its timeout
    /// - `InvalidResponse` if a non-empty response is not a JSON object
    pub async fn handle(&self, request: &InboundRequest) -> Result<DataMap, ProxyError> {
        let router = request
            .router
            .as_ref()
            .ok_or_else(|| ProxyError::unroutable("", 0, "request carries no route"))?;

        let channel = self.pool.channel(router).map_err(|e| {
            warn!(router = %router, error = %e, "No channel for route");
            e
        })?;

        let envelope = request.envelope();

        let Some(method) = CallMethod::from_call_name(&request.call_name) else {
            warn!(call_name = %request.call_name, "Unsupported call");
            return Err(ProxyError::unsupported(&request.call_name));
        };

        let body = serde_json::to_vec(&envelope)
            .map_err(|e| ProxyError::no_result(method.as_str(), e.to_string()))?;
        let timeout = self.config.timeout_for(method);
        let timer = SpanTimer::start(method.as_str());

        debug!(
            method = %method,
            router = %router,
            case_id = %request.case_id,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Forwarding call"
        );

        let response = match tokio::time::timeout(timeout, channel.call(method, body)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(method = %method, case_id = %request.case_id, error = %e, "Call failed");
                return Err(ProxyError::no_result(method.as_str(), e.to_string()));
            }
            Err(_) => {
                warn!(
                    method = %method,
                    case_id = %request.case_id,
                    elapsed_ms = timer.elapsed_ms(),
                    "Call timed out"
                );
                return Err(ProxyError::no_result(
                    method.as_str(),
                    format!("timed out after {}ms", timeout.as_millis()),
                ));
            }
        };

        let result = decode_response(&response)?;
        let duration_ms = timer.finish();
        info!(
            method = %method,
            case_id = %request.case_id,
            duration_ms,
            fields = result.len(),
            "Call completed"
        );
        Ok(result)
    }
}

fn decode_response(body: &[u8]) -> Result<DataMap, ProxyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DataMap::new());
    }
    serde_json::from_slice(body).map_err(|e| ProxyError::InvalidResponse(e.to_string()))
}

impl fmt::Debug for InferenceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceProxy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
