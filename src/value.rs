use serde::{Deserialize, Serialize};

use crate::{EvaluationContext, FeatureProvider, ResolutionDetail};

/// The type a flag is requested as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    Boolean,
    String,
    Integer,
    Float,
    Object,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::Boolean => "BOOLEAN",
            FlagType::String => "STRING",
            FlagType::Integer => "INTEGER",
            FlagType::Float => "FLOAT",
            FlagType::Object => "OBJECT",
        }
    }
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Rust type a flag can be evaluated to.
///
/// Implemented for `bool`, `String`, `i64`, `f64`, and `serde_json::Value` (object flags). The
/// trait connects three things: the [`FlagType`] tag, conversion from/to the JSON form that
/// backends and the wire use, and dispatch to the matching typed method of a
/// [`FeatureProvider`]. Generic code (caches, the multi-provider, the hook isolator) uses it to
/// handle all five flag types with a single implementation.
pub trait FlagValue: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    const TYPE: FlagType;

    /// Convert from JSON. Returns `None` if the value has a different type.
    fn from_json(value: &serde_json::Value) -> Option<Self>;

    fn to_json(&self) -> serde_json::Value;

    /// Call the typed `resolve_*_value` method of `provider` that matches `Self`.
    fn resolve<P: FeatureProvider + ?Sized>(
        provider: &P,
        flag_key: &str,
        default_value: Self,
        context: &EvaluationContext,
    ) -> ResolutionDetail<Self>;
}

impl FlagValue for bool {
    const TYPE: FlagType = FlagType::Boolean;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_bool()
    }

    fn to_json(&self) -> serde_json::Value {
        (*self).into()
    }

    fn resolve<P: FeatureProvider + ?Sized>(
        provider: &P,
        flag_key: &str,
        default_value: Self,
        context: &EvaluationContext,
    ) -> ResolutionDetail<Self> {
        provider.resolve_boolean_value(flag_key, default_value, context)
    }
}

impl FlagValue for String {
    const TYPE: FlagType = FlagType::String;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_str().map(ToOwned::to_owned)
    }

    fn to_json(&self) -> serde_json::Value {
        self.clone().into()
    }

    fn resolve<P: FeatureProvider + ?Sized>(
        provider: &P,
        flag_key: &str,
        default_value: Self,
        context: &EvaluationContext,
    ) -> ResolutionDetail<Self> {
        provider.resolve_string_value(flag_key, default_value, context)
    }
}

impl FlagValue for i64 {
    const TYPE: FlagType = FlagType::Integer;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_i64()
    }

    fn to_json(&self) -> serde_json::Value {
        (*self).into()
    }

    fn resolve<P: FeatureProvider + ?Sized>(
        provider: &P,
        flag_key: &str,
        default_value: Self,
        context: &EvaluationContext,
    ) -> ResolutionDetail<Self> {
        provider.resolve_integer_value(flag_key, default_value, context)
    }
}

impl FlagValue for f64 {
    const TYPE: FlagType = FlagType::Float;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        // Integers are valid floats. The reverse is not true.
        value.as_f64()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Number::from_f64(*self)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }

    fn resolve<P: FeatureProvider + ?Sized>(
        provider: &P,
        flag_key: &str,
        default_value: Self,
        context: &EvaluationContext,
    ) -> ResolutionDetail<Self> {
        provider.resolve_float_value(flag_key, default_value, context)
    }
}

impl FlagValue for serde_json::Value {
    const TYPE: FlagType = FlagType::Object;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        Some(value.clone())
    }

    fn to_json(&self) -> serde_json::Value {
        self.clone()
    }

    fn resolve<P: FeatureProvider + ?Sized>(
        provider: &P,
        flag_key: &str,
        default_value: Self,
        context: &EvaluationContext,
    ) -> ResolutionDetail<Self> {
        provider.resolve_object_value(flag_key, default_value, context)
    }
}
