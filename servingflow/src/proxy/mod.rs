//! The RPC boundary.
//!
//! [`InferenceProxy`] routes inbound calls to a [`ServingChannel`] obtained
//! from a [`ChannelPool`]. [`LocalChannel`] serves those calls against an
//! in-process [`crate::pipeline::PipelineTask`].

mod channel;
mod config;
mod local;
mod service;

#[cfg(test)]
pub(crate) use channel::{MockChannelPool, MockServingChannel};
pub use channel::{CallMethod, ChannelPool, RouterInfo, ServingChannel, StaticChannelPool};
pub use config::ProxyConfig;
pub use local::{LocalChannel, CASE_ID_KEY};
pub use service::{InboundRequest, InferenceProxy};
