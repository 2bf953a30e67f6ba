use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{hooks::Hook, EvaluationContext, EvaluationError, ResolutionDetail};

/// Descriptive information about a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
}

impl ProviderMetadata {
    pub fn new(name: impl Into<String>) -> ProviderMetadata {
        ProviderMetadata { name: name.into() }
    }
}

/// Readiness of a provider.
///
/// Variants are ordered from healthiest to least healthy, so the "worst" of several statuses is
/// their maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Ready,
    /// Serving, but values may be out of date.
    Stale,
    /// Not initialized yet.
    NotReady,
    /// Encountered a recoverable error.
    Error,
    /// Encountered an error it cannot recover from.
    Fatal,
}

/// An adapter that evaluates flags against one backend.
///
/// Evaluation methods never fail: on error they return the caller-supplied default value with
/// [`ResolutionDetail::error`] set.
pub trait FeatureProvider: Send + Sync {
    fn metadata(&self) -> ProviderMetadata;

    fn status(&self) -> ProviderStatus {
        ProviderStatus::Ready
    }

    /// Prepare the provider for evaluation (connect, fetch configuration, ...).
    fn initialize(&self, _context: &EvaluationContext) -> Result<(), EvaluationError> {
        Ok(())
    }

    fn shutdown(&self) {}

    /// Hooks the provider wants to run around each evaluation.
    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        Vec::new()
    }

    fn resolve_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> ResolutionDetail<bool>;

    fn resolve_string_value(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> ResolutionDetail<String>;

    fn resolve_integer_value(
        &self,
        flag_key: &str,
        default_value: i64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<i64>;

    fn resolve_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<f64>;

    /// Resolve a structured value. Backends that are type-agnostic (e.g., OFREP) also use this to
    /// return whatever value the flag holds.
    fn resolve_object_value(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: &EvaluationContext,
    ) -> ResolutionDetail<serde_json::Value>;
}

impl<P: FeatureProvider + ?Sized> FeatureProvider for Arc<P> {
    fn metadata(&self) -> ProviderMetadata {
        (**self).metadata()
    }

    fn status(&self) -> ProviderStatus {
        (**self).status()
    }

    fn initialize(&self, context: &EvaluationContext) -> Result<(), EvaluationError> {
        (**self).initialize(context)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }

    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        (**self).hooks()
    }

    fn resolve_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> ResolutionDetail<bool> {
        (**self).resolve_boolean_value(flag_key, default_value, context)
    }

    fn resolve_string_value(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> ResolutionDetail<String> {
        (**self).resolve_string_value(flag_key, default_value, context)
    }

    fn resolve_integer_value(
        &self,
        flag_key: &str,
        default_value: i64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<i64> {
        (**self).resolve_integer_value(flag_key, default_value, context)
    }

    fn resolve_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<f64> {
        (**self).resolve_float_value(flag_key, default_value, context)
    }

    fn resolve_object_value(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: &EvaluationContext,
    ) -> ResolutionDetail<serde_json::Value> {
        (**self).resolve_object_value(flag_key, default_value, context)
    }
}
