//! Call methods, routing and the channel abstraction.

use crate::errors::ProxyError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A serving method reachable through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallMethod {
    /// Synchronous inference.
    #[serde(rename = "inference")]
    Inference,
    /// Fetch the result of a previously started job.
    #[serde(rename = "getInferenceResult")]
    GetInferenceResult,
    /// Start an asynchronous inference job.
    #[serde(rename = "startInferenceJob")]
    StartInferenceJob,
}

impl CallMethod {
    /// Parses a wire call name.
    #[must_use]
    pub fn from_call_name(call_name: &str) -> Option<Self> {
        match call_name {
            "inference" => Some(Self::Inference),
            "getInferenceResult" => Some(Self::GetInferenceResult),
            "startInferenceJob" => Some(Self::StartInferenceJob),
            _ => None,
        }
    }

    /// Returns the wire call name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inference => "inference",
            Self::GetInferenceResult => "getInferenceResult",
            Self::StartInferenceJob => "startInferenceJob",
        }
    }
}

impl fmt::Display for CallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request is routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouterInfo {
    /// Target host.
    pub host: String,
    /// Target port.
    pub port: u16,
}

impl RouterInfo {
    /// Creates routing info.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for RouterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A connection to a serving endpoint.
///
/// Bodies are opaque bytes; the proxy sends JSON envelopes and expects JSON
/// maps back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServingChannel: Send + Sync {
    /// Invokes a method with a request body and returns the response body.
    async fn call(&self, method: CallMethod, body: Vec<u8>) -> Result<Vec<u8>, ProxyError>;
}

/// Hands out channels by route.
#[cfg_attr(test, mockall::automock)]
pub trait ChannelPool: Send + Sync {
    /// Returns a channel for the route.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Unroutable` if no channel can be obtained.
    fn channel(&self, router: &RouterInfo) -> Result<Arc<dyn ServingChannel>, ProxyError>;
}

/// A channel pool over a fixed set of registered routes.
#[derive(Default)]
pub struct StaticChannelPool {
    channels: DashMap<RouterInfo, Arc<dyn ServingChannel>>,
}

impl StaticChannelPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel for a route.
    #[must_use]
    pub fn with_channel(self, router: RouterInfo, channel: Arc<dyn ServingChannel>) -> Self {
        self.register(router, channel);
        self
    }

    /// Registers a channel for a route, replacing any previous one.
    pub fn register(&self, router: RouterInfo, channel: Arc<dyn ServingChannel>) {
        self.channels.insert(router, channel);
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl ChannelPool for StaticChannelPool {
    fn channel(&self, router: &RouterInfo) -> Result<Arc<dyn ServingChannel>, ProxyError> {
        self.channels
            .get(router)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ProxyError::unroutable(&router.host, router.port, "no channel registered"))
    }
}

impl fmt::Debug for StaticChannelPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: Vec<String> = self.channels.iter().map(|e| e.key().to_string()).collect();
        f.debug_struct("StaticChannelPool").field("routes", &routes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_method_names() {
        for method in [
            CallMethod::Inference,
            CallMethod::GetInferenceResult,
            CallMethod::StartInferenceJob,
        ] {
            assert_eq!(CallMethod::from_call_name(method.as_str()), Some(method));
        }
        assert_eq!(CallMethod::from_call_name("batchInference"), None);
        assert_eq!(
            serde_json::to_string(&CallMethod::StartInferenceJob).unwrap(),
            "\"startInferenceJob\""
        );
    }

    #[test]
    fn test_router_display() {
        assert_eq!(RouterInfo::new("10.0.0.7", 8000).to_string(), "10.0.0.7:8000");
    }

    #[test]
    fn test_static_pool_routes() {
        let router = RouterInfo::new("serving-a", 8000);
        let pool = StaticChannelPool::new()
            .with_channel(router.clone(), Arc::new(MockServingChannel::new()));

        assert_eq!(pool.len(), 1);
        assert!(pool.channel(&router).is_ok());

        let err = pool.channel(&RouterInfo::new("serving-b", 8000)).err().unwrap();
        assert!(matches!(err, ProxyError::Unroutable { port: 8000, .. }));
    }
}
