//! Data and blob maps.

use std::collections::{BTreeMap, HashMap};

/// A request input, stage output or response payload.
pub type DataMap = HashMap<String, serde_json::Value>;

/// Serialized model blobs keyed by `<component>.<suffix>` or the pipeline
/// definition key.
///
/// Ordered so that fingerprints and logs are deterministic.
pub type BlobMap = BTreeMap<String, Vec<u8>>;

/// Key of the blob holding the serialized pipeline definition.
pub const PIPELINE_DEFINITION_KEY: &str = "pipeline.pipeline:Pipeline";

/// Key under which a federated return code is merged into a response.
pub const RET_CODE_KEY: &str = "retcode";

/// Upstream index meaning "the original request input".
pub const REQUEST_INPUT_INDEX: i64 = -1;

/// Canonical suffix of a component's meta blob key.
pub const META_KEY_SUFFIX: &str = "Meta";

/// Canonical suffix of a component's param blob key.
pub const PARAM_KEY_SUFFIX: &str = "Param";
