//! Core types for servingflow.
//!
//! This module provides:
//! - Data and blob maps exchanged between stages
//! - Well-known keys shared with the RPC boundary
//! - Federated request parameters and return results

mod data;
mod federated;

pub use data::{
    BlobMap, DataMap, META_KEY_SUFFIX, PARAM_KEY_SUFFIX, PIPELINE_DEFINITION_KEY,
    REQUEST_INPUT_INDEX, RET_CODE_KEY,
};
pub use federated::{FederatedParams, FederatedParty, ReturnResult};
