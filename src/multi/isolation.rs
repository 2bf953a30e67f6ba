//! Keeps the hooks of one provider inside a multi-provider from seeing (and mutating) the
//! evaluation context of its siblings.
//!
//! The multi-provider exposes each [`HookIsolator`] as a hook to the client. In that role the
//! isolator only captures the client metadata and hints of the current evaluation, keyed by the
//! calling thread. The multi-provider takes that state back on the same thread before asking
//! its members, and the isolator then runs the wrapped provider's own hooks around that single
//! call. Captured state for another flag is discarded.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    thread::{self, ThreadId},
};

use crate::{
    client::ClientMetadata,
    hooks::{evaluate_with_hooks, Hook, HookContext, HookHints},
    EvaluationContext, EvaluationDetails, EvaluationError, FeatureProvider, FlagType, FlagValue,
    ProviderMetadata, ProviderStatus, ResolutionDetail,
};

/// Client metadata and hints of the evaluation in progress.
#[derive(Debug, Clone, Default)]
pub(crate) struct Captured {
    client_metadata: ClientMetadata,
    hints: HookHints,
}

/// Wraps a provider together with its hooks.
pub struct HookIsolator {
    provider: Arc<dyn FeatureProvider>,
    hooks: Vec<Arc<dyn Hook>>,
    captured: Mutex<HashMap<ThreadId, HookState>>,
    this: Weak<HookIsolator>,
}

struct HookState {
    flag_key: String,
    flag_type: FlagType,
    captured: Captured,
}

impl HookIsolator {
    /// Isolate `provider` and the hooks it declares.
    pub fn new(provider: Arc<dyn FeatureProvider>) -> Arc<HookIsolator> {
        HookIsolator::with_hooks(provider, Vec::new())
    }

    /// Isolate `provider`, its declared hooks, and `extra_hooks` (which run after them).
    pub fn with_hooks(
        provider: Arc<dyn FeatureProvider>,
        extra_hooks: Vec<Arc<dyn Hook>>,
    ) -> Arc<HookIsolator> {
        let mut hooks = provider.hooks();
        hooks.extend(extra_hooks);
        Arc::new_cyclic(|this| HookIsolator {
            provider,
            hooks,
            captured: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn provider(&self) -> &Arc<dyn FeatureProvider> {
        &self.provider
    }

    /// Remove the state captured on this thread. Returns it only if it belongs to `flag_key`
    /// requested as `flag_type`.
    pub(crate) fn take_captured(&self, flag_key: &str, flag_type: FlagType) -> Option<Captured> {
        let state = self
            .captured
            .lock()
            .expect("thread holding captured hook state should not panic")
            .remove(&thread::current().id())?;
        (state.flag_key == flag_key && state.flag_type == flag_type).then_some(state.captured)
    }

    pub(crate) fn evaluate<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        let captured = self.take_captured(flag_key, T::TYPE);
        self.evaluate_captured(captured, flag_key, default_value, context)
    }

    /// Evaluate with state previously taken by [`HookIsolator::take_captured`].
    pub(crate) fn evaluate_captured<T: FlagValue>(
        &self,
        captured: Option<Captured>,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        let Captured {
            client_metadata,
            hints,
        } = captured.unwrap_or_default();

        let hook_context = HookContext {
            flag_key: flag_key.to_owned(),
            flag_type: T::TYPE,
            default_value: default_value.to_json(),
            evaluation_context: context.clone(),
            client_metadata,
            provider_metadata: self.provider.metadata(),
        };

        evaluate_with_hooks(
            &self.hooks,
            hook_context,
            &hints,
            default_value.clone(),
            |context| T::resolve(&*self.provider, flag_key, default_value, context),
        )
    }
}

impl Hook for HookIsolator {
    fn before(
        &self,
        hook_context: &HookContext,
        hints: &HookHints,
    ) -> Result<Option<EvaluationContext>, EvaluationError> {
        self.captured
            .lock()
            .expect("thread holding captured hook state should not panic")
            .insert(
                thread::current().id(),
                HookState {
                    flag_key: hook_context.flag_key.clone(),
                    flag_type: hook_context.flag_type,
                    captured: Captured {
                        client_metadata: hook_context.client_metadata.clone(),
                        hints: hints.clone(),
                    },
                },
            );
        Ok(None)
    }

    /// Drops state left behind when the provider was never reached.
    fn finally(
        &self,
        _hook_context: &HookContext,
        _details: &EvaluationDetails<serde_json::Value>,
        _hints: &HookHints,
    ) {
        self.captured
            .lock()
            .expect("thread holding captured hook state should not panic")
            .remove(&thread::current().id());
    }
}

impl FeatureProvider for HookIsolator {
    fn metadata(&self) -> ProviderMetadata {
        self.provider.metadata()
    }

    fn status(&self) -> ProviderStatus {
        self.provider.status()
    }

    fn initialize(&self, context: &EvaluationContext) -> Result<(), EvaluationError> {
        self.provider.initialize(context)
    }

    fn shutdown(&self) {
        self.provider.shutdown()
    }

    /// The isolator itself is the only hook visible from outside.
    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        self.this
            .upgrade()
            .map(|this| vec![this as Arc<dyn Hook>])
            .unwrap_or_default()
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
