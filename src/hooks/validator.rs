use regex::Regex;

use super::{Hook, HookContext, HookHints};
use crate::{EvaluationDetails, EvaluationError, Result};

/// Decides whether an evaluated flag value is acceptable.
pub trait Validator: Send + Sync {
    /// Return `Err` with a human-readable reason to reject the evaluation.
    fn validate(&self, details: &EvaluationDetails<serde_json::Value>) -> std::result::Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&EvaluationDetails<serde_json::Value>) -> std::result::Result<(), String> + Send + Sync,
{
    fn validate(&self, details: &EvaluationDetails<serde_json::Value>) -> std::result::Result<(), String> {
        self(details)
    }
}

/// A hook that rejects evaluated values its [`Validator`] does not accept. Rejected evaluations
/// serve the default value with a `GENERAL` error.
///
/// ```
/// # use openfeature_contrib::hooks::{RegexValidator, ValidatorHook};
/// let hook = ValidatorHook::new(RegexValidator::hex());
/// ```
pub struct ValidatorHook<V> {
    validator: V,
}

impl<V: Validator> ValidatorHook<V> {
    pub fn new(validator: V) -> ValidatorHook<V> {
        ValidatorHook { validator }
    }
}

impl<V: Validator> Hook for ValidatorHook<V> {
    fn after(
        &self,
        _hook_context: &HookContext,
        details: &EvaluationDetails<serde_json::Value>,
        _hints: &HookHints,
    ) -> std::result::Result<(), EvaluationError> {
        self.validator.validate(details).map_err(|reason| {
            log::debug!(target: "openfeature",
                flag_key = details.flag_key.as_str(),
                value:serde = details.value;
                "validator rejected flag value: {}", reason);
            EvaluationError::general(reason)
        })
    }
}

/// Accepts string values matching a regular expression. Non-string values are rejected.
#[derive(Debug, Clone)]
pub struct RegexValidator {
    regex: Regex,
}

const HEX_PATTERN: &str = r"^[0-9a-fA-F]+$";

impl RegexValidator {
    pub fn new(pattern: &str) -> Result<RegexValidator> {
        Ok(RegexValidator {
            regex: Regex::new(pattern)?,
        })
    }

    /// Accepts non-empty hexadecimal strings (e.g., color codes without `#`).
    pub fn hex() -> RegexValidator {
        RegexValidator {
            regex: Regex::new(HEX_PATTERN).expect("hex pattern should be a valid regex"),
        }
    }
}

impl Validator for RegexValidator {
    fn validate(&self, details: &EvaluationDetails<serde_json::Value>) -> std::result::Result<(), String> {
        match details.value.as_str() {
            Some(value) if self.regex.is_match(value) => Ok(()),
            Some(value) => Err(format!(
                "value {value:?} does not match pattern {:?}",
                self.regex.as_str()
            )),
            None => Err(format!(
                "expected a string value to validate, got {}",
                details.value
            )),
        }
    }
}
