//! JSON bodies exchanged with the scanning service.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::exclusions::ExclusionRule;
use crate::payload::ScanPayload;

/// Body of a scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Text to scan.
    pub payloads: Vec<ScanPayload>,
    /// Exclusions the scanner applies on its side.
    #[serde(default)]
    pub exclusions: Vec<WireExclusion>,
    /// Free-form tags for the request.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Exclusion rule as the scanner expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireExclusion {
    /// One of `EXCLUSION_TYPE_PATH`, `EXCLUSION_TYPE_RAW_VALUE`, `EXCLUSION_TYPE_RULE`.
    pub exclusion_type: String,
    /// Rule value.
    pub value: String,
}

impl From<&ExclusionRule> for WireExclusion {
    fn from(rule: &ExclusionRule) -> Self {
        Self {
            exclusion_type: rule.exclusion_type.wire_name().to_string(),
            value: rule.value.clone(),
        }
    }
}

/// Overall result of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No secrets.
    NotFound,
    /// Secrets found.
    Found,
    /// Secrets found, but some payloads could not be scanned.
    FoundWithErrors,
    /// The scan as a whole timed out.
    ScanTimeout,
    /// The request was rejected as malformed.
    InputError,
    /// The scanner failed.
    ScanError,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// Result for a single payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    /// A secret was detected.
    Found,
    /// The payload could not be scanned.
    ScanError,
    /// Scanning the payload timed out.
    PayloadTimeout,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// A finding reported for one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Id of the payload (the blob id).
    pub payload_id: String,
    /// Outcome for the payload.
    pub status: FindingStatus,
    /// Line in the blob where the secret is.
    #[serde(default)]
    pub line_number: Option<usize>,
    /// Human-readable kind of secret.
    #[serde(default)]
    pub description: Option<String>,
    /// Rule id that matched.
    #[serde(rename = "type", default)]
    pub finding_type: Option<String>,
}

impl Finding {
    /// A detected secret.
    pub fn found(
        payload_id: impl Into<String>,
        line_number: usize,
        description: impl Into<String>,
    ) -> Self {
        Self {
            payload_id: payload_id.into(),
            status: FindingStatus::Found,
            line_number: Some(line_number),
            description: Some(description.into()),
            finding_type: None,
        }
    }

    /// A payload-level failure with no secret attached.
    pub fn failed(payload_id: impl Into<String>, status: FindingStatus) -> Self {
        Self {
            payload_id: payload_id.into(),
            status,
            line_number: None,
            description: None,
            finding_type: None,
        }
    }
}

/// Body of a scan response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    /// Overall status.
    pub status: ScanStatus,
    /// Per-payload findings.
    #[serde(default)]
    pub results: Vec<Finding>,
    /// Error detail, if any.
    #[serde(default)]
    pub message: Option<String>,
    /// Scanner-provided metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ScanResponse {
    /// Creates a response with the given status and findings.
    pub fn new(status: ScanStatus, results: Vec<Finding>) -> Self {
        Self {
            status,
            results,
            message: None,
            metadata: HashMap::new(),
        }
    }
}
