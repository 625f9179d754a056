//! Model blob maps: key remapping, the pipeline definition, and bundles.

use crate::core::{BlobMap, DataMap, META_KEY_SUFFIX, PARAM_KEY_SUFFIX, PIPELINE_DEFINITION_KEY};
use crate::errors::{PlanError, ServingError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Maps a raw blob key to its canonical form.
///
/// `<name>.<suffix>` becomes `<name>.Meta` or `<name>.Param` when `<suffix>`
/// ends in `Meta` or `Param`. The pipeline definition key and keys that do
/// not split into exactly two segments are returned unchanged.
#[must_use]
pub fn canonical_blob_key(key: &str) -> String {
    if key == PIPELINE_DEFINITION_KEY {
        return key.to_string();
    }

    let segments: Vec<&str> = key.split('.').collect();
    let [name, suffix] = segments.as_slice() else {
        return key.to_string();
    };

    if suffix.ends_with(META_KEY_SUFFIX) {
        format!("{name}.{META_KEY_SUFFIX}")
    } else if suffix.ends_with(PARAM_KEY_SUFFIX) {
        format!("{name}.{PARAM_KEY_SUFFIX}")
    } else {
        key.to_string()
    }
}

/// Rewrites every key of a blob map to its canonical form.
///
/// Total and idempotent: no blob is dropped unless two raw keys collapse to
/// the same canonical key, in which case the later key (in map order) wins.
#[must_use]
pub fn remap_blob_keys(blobs: BlobMap) -> BlobMap {
    let mut remapped = BlobMap::new();

    for (key, value) in blobs {
        let canonical = canonical_blob_key(&key);
        if canonical != key {
            tracing::trace!(from = %key, to = %canonical, "Remapped blob key");
        }
        if remapped.insert(canonical.clone(), value).is_some() {
            tracing::debug!(key = %canonical, source = %key, "Blob key collision, keeping later blob");
        }
    }

    remapped
}

/// Hex SHA-256 over all keys and blobs, identifying a pipeline version.
#[must_use]
pub fn blob_fingerprint(blobs: &BlobMap) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in blobs {
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    hex::encode(hasher.finalize())
}

/// The decoded pipeline definition blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// The inference DSL text handed to the graph resolver.
    pub inference_dsl: String,
    /// Additional metadata carried alongside the DSL.
    #[serde(default, skip_serializing_if = "DataMap::is_empty")]
    pub metadata: DataMap,
}

impl PipelineDefinition {
    /// Creates a definition from DSL text.
    #[must_use]
    pub fn new(inference_dsl: impl Into<String>) -> Self {
        Self {
            inference_dsl: inference_dsl.into(),
            metadata: DataMap::new(),
        }
    }

    /// Decodes a definition blob.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::InvalidPipelineDefinition` if the blob is not a
    /// valid definition document.
    pub fn decode(blob: &[u8]) -> Result<Self, PlanError> {
        serde_json::from_slice(blob).map_err(|e| PlanError::invalid_definition(e.to_string()))
    }

    /// Encodes the definition into its blob form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ServingError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Parses a blob bundle: a JSON object mapping blob keys to base64 strings.
///
/// # Errors
///
/// Returns `ServingError::Serialization` on malformed JSON or base64.
pub fn blob_map_from_json(json: &str) -> Result<BlobMap, ServingError> {
    let encoded: BTreeMap<String, String> = serde_json::from_str(json)?;

    encoded
        .into_iter()
        .map(|(key, value)| {
            STANDARD
                .decode(value.as_bytes())
                .map(|bytes| (key.clone(), bytes))
                .map_err(|e| ServingError::Serialization(format!("blob '{key}': {e}")))
        })
        .collect()
}

/// Serializes a blob map into bundle form.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn blob_map_to_json(blobs: &BlobMap) -> Result<String, ServingError> {
    let encoded: BTreeMap<&str, String> = blobs
        .iter()
        .map(|(key, value)| (key.as_str(), STANDARD.encode(value)))
        .collect();
    Ok(serde_json::to_string(&encoded)?)
}

/// Reads a blob bundle from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_blob_bundle(path: impl AsRef<Path>) -> Result<BlobMap, ServingError> {
    let json = std::fs::read_to_string(path.as_ref())?;
    blob_map_from_json(&json)
}
