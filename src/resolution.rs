use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ErrorCode, EvaluationError, FlagValue};

/// Free-form metadata a provider attaches to a resolution.
pub type FlagMetadata = BTreeMap<String, serde_json::Value>;

/// Why a flag resolved to the value it did.
///
/// Known reasons serialize as SCREAMING_SNAKE_CASE strings. Anything else is carried verbatim in
/// [`Reason::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Reason {
    /// The value is statically configured.
    Static,
    /// The default value of the flag was served.
    Default,
    /// A targeting rule matched.
    TargetingMatch,
    /// A pseudorandom split assigned the value.
    Split,
    /// The value was served from a cache.
    Cached,
    /// The flag is disabled.
    Disabled,
    Unknown,
    /// The value may be out of date.
    Stale,
    /// An error occurred; the default value was served.
    Error,
    Other(String),
}

impl Reason {
    pub fn as_str(&self) -> &str {
        match self {
            Reason::Static => "STATIC",
            Reason::Default => "DEFAULT",
            Reason::TargetingMatch => "TARGETING_MATCH",
            Reason::Split => "SPLIT",
            Reason::Cached => "CACHED",
            Reason::Disabled => "DISABLED",
            Reason::Unknown => "UNKNOWN",
            Reason::Stale => "STALE",
            Reason::Error => "ERROR",
            Reason::Other(other) => other,
        }
    }
}

impl From<String> for Reason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "STATIC" => Reason::Static,
            "DEFAULT" => Reason::Default,
            "TARGETING_MATCH" => Reason::TargetingMatch,
            "SPLIT" => Reason::Split,
            "CACHED" => Reason::Cached,
            "DISABLED" => Reason::Disabled,
            "UNKNOWN" => Reason::Unknown,
            "STALE" => Reason::Stale,
            "ERROR" => Reason::Error,
            _ => Reason::Other(value),
        }
    }
}

impl From<Reason> for String {
    fn from(value: Reason) -> Self {
        match value {
            Reason::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value a provider resolved for a flag, plus what is known about how it got there.
///
/// On failure, `value` holds the caller-supplied default and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDetail<T> {
    pub value: T,
    pub variant: Option<String>,
    pub reason: Option<Reason>,
    pub error: Option<EvaluationError>,
    pub flag_metadata: FlagMetadata,
}

impl<T> ResolutionDetail<T> {
    pub fn new(value: T) -> ResolutionDetail<T> {
        ResolutionDetail {
            value,
            variant: None,
            reason: None,
            error: None,
            flag_metadata: FlagMetadata::new(),
        }
    }

    /// Resolution that serves `default` because of `error`.
    pub fn from_error(default: T, error: EvaluationError) -> ResolutionDetail<T> {
        ResolutionDetail {
            value: default,
            variant: None,
            reason: Some(Reason::Error),
            error: Some(error),
            flag_metadata: FlagMetadata::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.flag_metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|it| it.code)
    }

    /// Map `ResolutionDetail.value` using the `f` function.
    pub fn map<T2, F: FnOnce(T) -> T2>(self, f: F) -> ResolutionDetail<T2> {
        ResolutionDetail {
            value: f(self.value),
            variant: self.variant,
            reason: self.reason,
            error: self.error,
            flag_metadata: self.flag_metadata,
        }
    }
}

impl<T: FlagValue> ResolutionDetail<T> {
    pub fn to_json(&self) -> ResolutionDetail<serde_json::Value> {
        ResolutionDetail {
            value: self.value.to_json(),
            variant: self.variant.clone(),
            reason: self.reason.clone(),
            error: self.error.clone(),
            flag_metadata: self.flag_metadata.clone(),
        }
    }
}

impl ResolutionDetail<serde_json::Value> {
    /// Convert a JSON-valued resolution into a typed one.
    ///
    /// If the value has the wrong type, `default` is served with a `TYPE_MISMATCH` error. Errors
    /// already present are kept as-is.
    pub fn into_typed<T: FlagValue>(mut self, default: T) -> ResolutionDetail<T> {
        if let Some(error) = self.error.take() {
            let mut detail = ResolutionDetail::from_error(default, error);
            detail.flag_metadata = self.flag_metadata;
            return detail;
        }
        match T::from_json(&self.value) {
            Some(value) => self.map(|_| value),
            None => ResolutionDetail::from_error(
                default,
                EvaluationError::new(
                    ErrorCode::TypeMismatch,
                    format!("expected {} value, got {}", T::TYPE, self.value),
                ),
            ),
        }
    }
}

/// A resolution together with the key of the flag it belongs to. This is what clients return
/// and what hooks observe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetails<T> {
    pub flag_key: String,
    pub value: T,
    pub variant: Option<String>,
    pub reason: Option<Reason>,
    pub error: Option<EvaluationError>,
    pub flag_metadata: FlagMetadata,
}

impl<T> EvaluationDetails<T> {
    pub fn from_resolution(flag_key: impl Into<String>, resolution: ResolutionDetail<T>) -> Self {
        EvaluationDetails {
            flag_key: flag_key.into(),
            value: resolution.value,
            variant: resolution.variant,
            reason: resolution.reason,
            error: resolution.error,
            flag_metadata: resolution.flag_metadata,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|it| it.code)
    }
}
