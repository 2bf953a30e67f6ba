//! A provider serving flags defined in code. Useful for tests, local development, and as the
//! backing store behind an OFREP handler.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use crate::{
    EvaluationContext, EvaluationError, ErrorCode, FeatureProvider, FlagMetadata, FlagValue,
    ProviderMetadata, Reason, ResolutionDetail,
};

/// Picks a variant for a context. Returning `None` falls through to the default variant.
pub type ContextEvaluator = Arc<dyn Fn(&EvaluationContext) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagState {
    #[default]
    Enabled,
    Disabled,
}

/// A flag definition held by [`InMemoryProvider`].
#[derive(Clone)]
pub struct InMemoryFlag {
    pub default_variant: String,
    pub variants: BTreeMap<String, serde_json::Value>,
    pub state: FlagState,
    pub context_evaluator: Option<ContextEvaluator>,
    pub metadata: FlagMetadata,
}

impl InMemoryFlag {
    /// A flag with the given variants, serving `default_variant` unless a context evaluator
    /// says otherwise.
    pub fn new<V: Into<serde_json::Value>>(
        default_variant: impl Into<String>,
        variants: impl IntoIterator<Item = (&'static str, V)>,
    ) -> InMemoryFlag {
        InMemoryFlag {
            default_variant: default_variant.into(),
            variants: variants
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value.into()))
                .collect(),
            state: FlagState::Enabled,
            context_evaluator: None,
            metadata: FlagMetadata::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.state = FlagState::Disabled;
        self
    }

    pub fn with_context_evaluator(
        mut self,
        evaluator: impl Fn(&EvaluationContext) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.context_evaluator = Some(Arc::new(evaluator));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Debug for InMemoryFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFlag")
            .field("default_variant", &self.default_variant)
            .field("variants", &self.variants)
            .field("state", &self.state)
            .field("context_evaluator", &self.context_evaluator.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Serves flags from an in-memory map that can be replaced at runtime.
#[derive(Default)]
pub struct InMemoryProvider {
    flags: RwLock<HashMap<String, InMemoryFlag>>,
}

impl InMemoryProvider {
    pub fn new(flags: impl IntoIterator<Item = (String, InMemoryFlag)>) -> InMemoryProvider {
        InMemoryProvider {
            flags: RwLock::new(flags.into_iter().collect()),
        }
    }

    /// Insert or replace a single flag.
    pub fn set_flag(&self, flag_key: impl Into<String>, flag: InMemoryFlag) {
        self.flags
            .write()
            .expect("thread holding flags lock should not panic")
            .insert(flag_key.into(), flag);
    }

    /// Replace all flags.
    pub fn replace_flags(&self, flags: impl IntoIterator<Item = (String, InMemoryFlag)>) {
        let new_flags = flags.into_iter().collect();
        *self
            .flags
            .write()
            .expect("thread holding flags lock should not panic") = new_flags;
    }

    fn evaluate<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        let flag = {
            let flags = self
                .flags
                .read()
                .expect("thread holding flags lock should not panic");
            flags.get(flag_key).cloned()
        };
        let Some(flag) = flag else {
            return ResolutionDetail::from_error(
                default_value,
                EvaluationError::flag_not_found(flag_key),
            );
        };

        if flag.state == FlagState::Disabled {
            let mut detail = ResolutionDetail::new(default_value).with_reason(Reason::Disabled);
            detail.flag_metadata = flag.metadata;
            return detail;
        }

        let (variant, reason) = match flag
            .context_evaluator
            .as_ref()
            .and_then(|evaluator| evaluator(context))
        {
            Some(variant) => (variant, Reason::TargetingMatch),
            None => (flag.default_variant.clone(), Reason::Static),
        };

        let Some(value) = flag.variants.get(&variant) else {
            return ResolutionDetail::from_error(
                default_value,
                EvaluationError::general(format!(
                    "variant {variant:?} of flag {flag_key:?} is not defined"
                )),
            );
        };

        let Some(value) = T::from_json(value) else {
            return ResolutionDetail::from_error(
                default_value,
                EvaluationError::new(
                    ErrorCode::TypeMismatch,
                    format!("flag {flag_key:?} is not of type {}", T::TYPE),
                ),
            );
        };

        let mut detail = ResolutionDetail::new(value)
            .with_variant(variant)
            .with_reason(reason);
        detail.flag_metadata = flag.metadata;
        detail
    }
}

impl FeatureProvider for InMemoryProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new("InMemoryProvider")
    }

    fn resolve_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> ResolutionDetail<bool> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_string_value(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> ResolutionDetail<String> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_integer_value(
        &self,
        flag_key: &str,
        default_value: i64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<i64> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<f64> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_object_value(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: &EvaluationContext,
    ) -> ResolutionDetail<serde_json::Value> {
        self.evaluate(flag_key, default_value, context)
    }
}
