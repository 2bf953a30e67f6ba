use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Represents a result type for operations that configure or construct providers, hooks, and
/// tools.
///
/// Flag evaluation itself never returns this type: evaluation failures are reported inside
/// [`ResolutionDetail`](crate::ResolutionDetail) as an [`EvaluationError`].
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur while configuring providers or talking to a
/// remote flag service.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid base URL / endpoint configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// A configuration value is missing or cannot be interpreted.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A validation pattern failed to compile.
    #[error("invalid validation pattern")]
    InvalidPattern(#[source] regex::Error),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        Error::InvalidPattern(value)
    }
}

/// The fixed error taxonomy every provider maps its backend failures into.
///
/// Serialized as SCREAMING_SNAKE_CASE, which is also the OFREP wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The provider has not been initialized yet.
    ProviderNotReady,
    /// The provider is in an irrecoverable state.
    ProviderFatal,
    /// The flag does not exist in the backend.
    FlagNotFound,
    /// The flag definition or a request could not be parsed.
    ParseError,
    /// The flag value does not match the requested type.
    TypeMismatch,
    /// The backend requires a targeting key that the context does not carry.
    TargetingKeyMissing,
    /// The evaluation context is invalid for the backend.
    InvalidContext,
    /// Any other failure.
    #[serde(other)]
    General,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProviderNotReady => "PROVIDER_NOT_READY",
            ErrorCode::ProviderFatal => "PROVIDER_FATAL",
            ErrorCode::FlagNotFound => "FLAG_NOT_FOUND",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::TargetingKeyMissing => "TARGETING_KEY_MISSING",
            ErrorCode::InvalidContext => "INVALID_CONTEXT",
            ErrorCode::General => "GENERAL",
        }
    }

    /// Return `true` if the error is a normal running condition (e.g., the flag simply is not
    /// defined in this backend) and should not be logged loudly.
    pub(crate) fn is_normal(self) -> bool {
        match self {
            ErrorCode::FlagNotFound | ErrorCode::ProviderNotReady => true,

            ErrorCode::ProviderFatal
            | ErrorCode::ParseError
            | ErrorCode::TypeMismatch
            | ErrorCode::TargetingKeyMissing
            | ErrorCode::InvalidContext
            | ErrorCode::General => false,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An evaluation failure: an [`ErrorCode`] plus an optional human-readable message.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct EvaluationError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl EvaluationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> EvaluationError {
        EvaluationError {
            code,
            message: Some(message.into()),
        }
    }

    pub fn from_code(code: ErrorCode) -> EvaluationError {
        EvaluationError {
            code,
            message: None,
        }
    }

    pub fn flag_not_found(flag_key: &str) -> EvaluationError {
        EvaluationError::new(
            ErrorCode::FlagNotFound,
            format!("flag {flag_key:?} not found"),
        )
    }

    pub fn general(message: impl Into<String>) -> EvaluationError {
        EvaluationError::new(ErrorCode::General, message)
    }

    /// Message, or the code name when there is no message.
    pub fn details(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| self.code.as_str().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, EvaluationError};

    #[test]
    fn unknown_wire_codes_map_to_general() {
        let code: ErrorCode = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(code, ErrorCode::General);

        let code: ErrorCode = serde_json::from_str("\"TARGETING_KEY_MISSING\"").unwrap();
        assert_eq!(code, ErrorCode::TargetingKeyMissing);
    }

    #[test]
    fn display_includes_message_when_present() {
        assert_eq!(
            EvaluationError::new(ErrorCode::ParseError, "bad json").to_string(),
            "PARSE_ERROR: bad json"
        );
        assert_eq!(
            EvaluationError::from_code(ErrorCode::General).to_string(),
            "GENERAL"
        );
    }
}
