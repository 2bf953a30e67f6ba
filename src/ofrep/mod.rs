//! OpenFeature Remote Evaluation Protocol (OFREP): wire types and an HTTP handler serving single
//! flag evaluations.
use serde::{Deserialize, Serialize};

use crate::{ErrorCode, FlagMetadata, Reason};

mod handler;

pub use handler::{HandlerOptions, OfrepHandler, DEFAULT_PATH_PREFIX};

/// Body of `POST /ofrep/v1/evaluate/flags/{key}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Flattened evaluation context. See [`EvaluationContext::flatten`](crate::EvaluationContext::flatten).
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

/// Response body of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSuccess {
    pub key: String,
    pub value: serde_json::Value,
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FlagMetadata>,
}

/// Response body of a failed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub error_code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}
