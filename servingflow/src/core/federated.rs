//! Federated request parameters and remote return results.

use super::DataMap;
use serde::{Deserialize, Serialize};

/// A party taking part in a federated inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedParty {
    /// The party's role (e.g. "guest", "host").
    pub role: String,
    /// The party identifier.
    pub party_id: String,
}

impl FederatedParty {
    /// Creates a new party.
    #[must_use]
    pub fn new(role: impl Into<String>, party_id: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            party_id: party_id.into(),
        }
    }
}

/// Per-request parameters handed to every stage's `predict`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederatedParams {
    /// Case identifier correlating the parties' work on one request.
    #[serde(default)]
    pub case_id: String,
    /// Sequence number supplied by the caller.
    #[serde(default)]
    pub seq_no: String,
    /// The local party, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<FederatedParty>,
    /// Feature identifiers used to look up remote-side features.
    #[serde(default)]
    pub feature_ids: DataMap,
    /// Any further request parameters.
    #[serde(default)]
    pub extra: DataMap,
}

impl FederatedParams {
    /// Creates parameters for a case.
    #[must_use]
    pub fn new(case_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            ..Default::default()
        }
    }

    /// Sets the sequence number.
    #[must_use]
    pub fn with_seq_no(mut self, seq_no: impl Into<String>) -> Self {
        self.seq_no = seq_no.into();
        self
    }

    /// Sets the local party.
    #[must_use]
    pub fn with_local(mut self, party: FederatedParty) -> Self {
        self.local = Some(party);
        self
    }

    /// Sets the feature identifiers.
    #[must_use]
    pub fn with_feature_ids(mut self, feature_ids: DataMap) -> Self {
        self.feature_ids = feature_ids;
        self
    }
}

/// Result returned by a remote party during a federated stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnResult {
    /// Return code; `0` means success.
    pub retcode: i32,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retmsg: Option<String>,
    /// Result payload.
    #[serde(default)]
    pub data: DataMap,
}

impl ReturnResult {
    /// Creates a result with the given return code.
    #[must_use]
    pub fn new(retcode: i32) -> Self {
        Self {
            retcode,
            ..Default::default()
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.retmsg = Some(message.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: DataMap) -> Self {
        self.data = data;
        self
    }

    /// Returns true for a zero return code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.retcode == 0
    }
}
