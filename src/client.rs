use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    hooks::{evaluate_with_hooks, Hook, HookContext, HookHints},
    ErrorCode, EvaluationContext, EvaluationDetails, EvaluationError, FeatureProvider, FlagValue,
    ProviderStatus, ResolutionDetail,
};

/// Descriptive information about a client, passed to hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub name: String,
}

/// Per-call evaluation options.
#[derive(Default, Clone)]
pub struct EvaluationOptions {
    /// Hooks that run for this call only, after the client's hooks and before the provider's.
    pub hooks: Vec<Arc<dyn Hook>>,
    pub hints: HookHints,
}

/// Evaluates flags against a [`FeatureProvider`], running hooks around each evaluation.
///
/// The evaluation context passed to the provider is the invocation context merged with the
/// client context (invocation attributes win), plus whatever `before` hooks add.
///
/// # Examples
/// ```
/// # use openfeature_contrib::{Client, EvaluationContext};
/// # use openfeature_contrib::providers::{InMemoryFlag, InMemoryProvider};
/// let provider = InMemoryProvider::new([(
///     "new-checkout".to_owned(),
///     InMemoryFlag::new("on", [("on", true), ("off", false)]),
/// )]);
/// let client = Client::new(provider).with_name("checkout");
///
/// let enabled = client.get_boolean_value("new-checkout", false, None);
/// assert!(enabled);
/// ```
pub struct Client {
    provider: Arc<dyn FeatureProvider>,
    metadata: ClientMetadata,
    context: EvaluationContext,
    hooks: Vec<Arc<dyn Hook>>,
}

impl Client {
    pub fn new(provider: impl FeatureProvider + 'static) -> Client {
        Client::from_provider(Arc::new(provider))
    }

    pub fn from_provider(provider: Arc<dyn FeatureProvider>) -> Client {
        Client {
            provider,
            metadata: ClientMetadata::default(),
            context: EvaluationContext::new(),
            hooks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Set the client-level evaluation context.
    pub fn with_context(mut self, context: EvaluationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn with_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn Hook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    pub fn metadata(&self) -> &ClientMetadata {
        &self.metadata
    }

    pub fn provider(&self) -> &Arc<dyn FeatureProvider> {
        &self.provider
    }

    /// Initialize the provider with the client context.
    pub fn initialize(&self) -> Result<(), EvaluationError> {
        log::debug!(target: "openfeature",
            provider = self.provider.metadata().name.as_str();
            "initializing provider");
        self.provider.initialize(&self.context).inspect_err(|err| {
            log::warn!(target: "openfeature",
                provider = self.provider.metadata().name.as_str();
                "provider failed to initialize: {}", err);
        })
    }

    pub fn shutdown(&self) {
        self.provider.shutdown();
    }

    /// Evaluate a boolean flag, returning `default_value` on any error.
    pub fn get_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: Option<&EvaluationContext>,
    ) -> bool {
        self.get_value(flag_key, default_value, context)
    }

    /// Evaluate a string flag, returning `default_value` on any error.
    pub fn get_string_value(
        &self,
        flag_key: &str,
        default_value: impl Into<String>,
        context: Option<&EvaluationContext>,
    ) -> String {
        self.get_value(flag_key, default_value.into(), context)
    }

    /// Evaluate an integer flag, returning `default_value` on any error.
    pub fn get_integer_value(
        &self,
        flag_key: &str,
        default_value: i64,
        context: Option<&EvaluationContext>,
    ) -> i64 {
        self.get_value(flag_key, default_value, context)
    }

    /// Evaluate a float flag, returning `default_value` on any error.
    pub fn get_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: Option<&EvaluationContext>,
    ) -> f64 {
        self.get_value(flag_key, default_value, context)
    }

    /// Evaluate an object flag, returning `default_value` on any error.
    pub fn get_object_value(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: Option<&EvaluationContext>,
    ) -> serde_json::Value {
        self.get_value(flag_key, default_value, context)
    }

    pub fn get_value<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: Option<&EvaluationContext>,
    ) -> T {
        self.get_details(flag_key, default_value, context, &EvaluationOptions::default())
            .value
    }

    /// Evaluate a flag and return full evaluation details.
    ///
    /// # Examples
    /// ```
    /// # use openfeature_contrib::{Client, EvaluationOptions, ErrorCode};
    /// # use openfeature_contrib::providers::InMemoryProvider;
    /// let client = Client::new(InMemoryProvider::default());
    /// let details = client.get_details("missing", 10_i64, None, &EvaluationOptions::default());
    /// assert_eq!(details.value, 10);
    /// assert_eq!(details.error_code(), Some(ErrorCode::FlagNotFound));
    /// ```
    pub fn get_details<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: Option<&EvaluationContext>,
        options: &EvaluationOptions,
    ) -> EvaluationDetails<T> {
        let evaluation_context = match context {
            Some(invocation) => EvaluationContext::merge([invocation, &self.context]),
            None => self.context.clone(),
        };

        let hooks = self
            .hooks
            .iter()
            .chain(options.hooks.iter())
            .cloned()
            .chain(self.provider.hooks())
            .collect::<Vec<_>>();

        let hook_context = HookContext {
            flag_key: flag_key.to_owned(),
            flag_type: T::TYPE,
            default_value: default_value.to_json(),
            evaluation_context,
            client_metadata: self.metadata.clone(),
            provider_metadata: self.provider.metadata(),
        };

        let resolution = evaluate_with_hooks(
            &hooks,
            hook_context,
            &options.hints,
            default_value.clone(),
            |context| self.resolve(flag_key, default_value, context),
        );

        match &resolution.error {
            Some(error) if !error.code.is_normal() => {
                log::warn!(target: "openfeature",
                    flag_key,
                    error_code = error.code.as_str();
                    "error occurred while evaluating a flag: {}", error);
            }
            _ => {
                log::trace!(target: "openfeature",
                    flag_key,
                    value:serde = resolution.value.to_json();
                    "evaluated a flag");
            }
        }

        EvaluationDetails::from_resolution(flag_key, resolution)
    }

    fn resolve<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        match self.provider.status() {
            ProviderStatus::NotReady => ResolutionDetail::from_error(
                default_value,
                EvaluationError::new(ErrorCode::ProviderNotReady, "provider is not ready"),
            ),
            ProviderStatus::Fatal => ResolutionDetail::from_error(
                default_value,
                EvaluationError::new(
                    ErrorCode::ProviderFatal,
                    "provider is in an irrecoverable state",
                ),
            ),
            ProviderStatus::Ready | ProviderStatus::Stale | ProviderStatus::Error => {
                T::resolve(&*self.provider, flag_key, default_value, context)
            }
        }
    }
}
