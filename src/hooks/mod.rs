//! Hooks run around every evaluation: `before` may enrich the evaluation context or abort,
//! `after` may reject a successful result, `error` observes failures, and `finally` always runs.
//!
//! `before` hooks run in registration order. `after`, `error`, and `finally` run in reverse order.
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    client::ClientMetadata, EvaluationContext, EvaluationDetails, EvaluationError, FlagType,
    FlagValue, ProviderMetadata, ResolutionDetail,
};

mod validator;

pub use validator::{RegexValidator, Validator, ValidatorHook};

/// Arbitrary data passed from the caller to its hooks.
pub type HookHints = BTreeMap<String, serde_json::Value>;

/// Everything a hook knows about the evaluation it is attached to.
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    pub flag_key: String,
    pub flag_type: FlagType,
    pub default_value: serde_json::Value,
    pub evaluation_context: EvaluationContext,
    pub client_metadata: ClientMetadata,
    pub provider_metadata: ProviderMetadata,
}

/// A callback invoked around flag evaluation. All stages are no-ops by default.
pub trait Hook: Send + Sync {
    /// Runs before evaluation. A returned context is merged into the current one; attributes
    /// already present take precedence. An error aborts evaluation and the default value is
    /// served.
    fn before(
        &self,
        _hook_context: &HookContext,
        _hints: &HookHints,
    ) -> Result<Option<EvaluationContext>, EvaluationError> {
        Ok(None)
    }

    /// Runs after a successful evaluation. An error turns the result into the default value.
    fn after(
        &self,
        _hook_context: &HookContext,
        _details: &EvaluationDetails<serde_json::Value>,
        _hints: &HookHints,
    ) -> Result<(), EvaluationError> {
        Ok(())
    }

    /// Runs when the provider or another hook reports an error.
    fn error(&self, _hook_context: &HookContext, _error: &EvaluationError, _hints: &HookHints) {}

    /// Runs last, with the final details, whether or not evaluation failed.
    fn finally(
        &self,
        _hook_context: &HookContext,
        _details: &EvaluationDetails<serde_json::Value>,
        _hints: &HookHints,
    ) {
    }
}

/// Run `before` hooks in order, folding returned contexts into `hook_context`.
pub(crate) fn run_before_hooks(
    hooks: &[Arc<dyn Hook>],
    hook_context: &mut HookContext,
    hints: &HookHints,
) -> Result<(), EvaluationError> {
    for hook in hooks {
        if let Some(context) = hook.before(hook_context, hints)? {
            hook_context.evaluation_context =
                EvaluationContext::merge([&hook_context.evaluation_context, &context]);
        }
    }
    Ok(())
}

pub(crate) fn run_after_hooks(
    hooks: &[Arc<dyn Hook>],
    hook_context: &HookContext,
    details: &EvaluationDetails<serde_json::Value>,
    hints: &HookHints,
) -> Result<(), EvaluationError> {
    for hook in hooks.iter().rev() {
        hook.after(hook_context, details, hints)?;
    }
    Ok(())
}

pub(crate) fn run_error_hooks(
    hooks: &[Arc<dyn Hook>],
    hook_context: &HookContext,
    error: &EvaluationError,
    hints: &HookHints,
) {
    for hook in hooks.iter().rev() {
        hook.error(hook_context, error, hints);
    }
}

pub(crate) fn run_finally_hooks(
    hooks: &[Arc<dyn Hook>],
    hook_context: &HookContext,
    details: &EvaluationDetails<serde_json::Value>,
    hints: &HookHints,
) {
    for hook in hooks.iter().rev() {
        hook.finally(hook_context, details, hints);
    }
}

/// Evaluate a flag with the full hook lifecycle around `resolve`.
///
/// `resolve` receives the evaluation context after all `before` hooks ran.
pub(crate) fn evaluate_with_hooks<T: FlagValue>(
    hooks: &[Arc<dyn Hook>],
    mut hook_context: HookContext,
    hints: &HookHints,
    default_value: T,
    resolve: impl FnOnce(&EvaluationContext) -> ResolutionDetail<T>,
) -> ResolutionDetail<T> {
    let resolution = match run_before_hooks(hooks, &mut hook_context, hints) {
        Err(error) => {
            log::warn!(target: "openfeature",
                flag_key = hook_context.flag_key.as_str();
                "before hook failed: {}", error);
            run_error_hooks(hooks, &hook_context, &error, hints);
            ResolutionDetail::from_error(default_value, error)
        }
        Ok(()) => {
            let resolution = resolve(&hook_context.evaluation_context);
            match &resolution.error {
                Some(error) => {
                    run_error_hooks(hooks, &hook_context, error, hints);
                    resolution
                }
                None => {
                    let details = EvaluationDetails::from_resolution(
                        hook_context.flag_key.clone(),
                        resolution.to_json(),
                    );
                    match run_after_hooks(hooks, &hook_context, &details, hints) {
                        Ok(()) => resolution,
                        Err(error) => {
                            log::warn!(target: "openfeature",
                                flag_key = hook_context.flag_key.as_str();
                                "after hook rejected evaluation: {}", error);
                            run_error_hooks(hooks, &hook_context, &error, hints);
                            ResolutionDetail::from_error(default_value, error)
                        }
                    }
                }
            }
        }
    };

    let details =
        EvaluationDetails::from_resolution(hook_context.flag_key.clone(), resolution.to_json());
    run_finally_hooks(hooks, &hook_context, &details, hints);

    resolution
}


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{evaluate_with_hooks, testing::RecordingHook, Hook, HookContext, HookHints};
    use crate::{
        client::ClientMetadata, ErrorCode, EvaluationContext, FlagType, ProviderMetadata, Reason,
        ResolutionDetail,
    };

    fn hook_context() -> HookContext {
        HookContext {
            flag_key: "flag".to_owned(),
            flag_type: FlagType::Boolean,
            default_value: false.into(),
            evaluation_context: EvaluationContext::new().with_attribute("plan", "pro"),
            client_metadata: ClientMetadata::default(),
            provider_metadata: ProviderMetadata::new("test"),
        }
    }

    #[test]
    fn stages_run_in_lifecycle_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks: Vec<Arc<dyn Hook>> = vec![
            Arc::new(RecordingHook::new("a", &log)),
            Arc::new(RecordingHook::new("b", &log)),
        ];

        let resolution = evaluate_with_hooks(&hooks, hook_context(), &HookHints::new(), false, |_| {
            ResolutionDetail::new(true).with_reason(Reason::Static)
        });

        assert!(resolution.value);
        assert_eq!(
            *log.lock().unwrap(),
            ["a:before", "b:before", "b:after", "a:after", "b:finally", "a:finally"]
        );
    }

    #[test]
    fn before_contexts_only_add_attributes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks: Vec<Arc<dyn Hook>> = vec![Arc::new(RecordingHook::new("a", &log).returning(
            EvaluationContext::new()
                .with_attribute("plan", "free")
                .with_attribute("region", "eu"),
        ))];

        let mut seen = None;
        evaluate_with_hooks(&hooks, hook_context(), &HookHints::new(), false, |context| {
            seen = Some(context.clone());
            ResolutionDetail::new(true)
        });

        let seen = seen.unwrap();
        assert_eq!(seen.attribute("plan"), Some(&"pro".into()));
        assert_eq!(seen.attribute("region"), Some(&"eu".into()));
    }

    #[test]
    fn failing_before_skips_resolution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks: Vec<Arc<dyn Hook>> =
            vec![Arc::new(RecordingHook::new("a", &log).failing_before())];

        let resolution = evaluate_with_hooks(&hooks, hook_context(), &HookHints::new(), false, |_| {
            panic!("provider must not be called")
        });

        assert!(!resolution.value);
        assert_eq!(resolution.error_code(), Some(ErrorCode::General));
        assert_eq!(*log.lock().unwrap(), ["a:before", "a:error", "a:finally"]);
    }

    #[test]
    fn failing_after_serves_default() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks: Vec<Arc<dyn Hook>> =
            vec![Arc::new(RecordingHook::new("a", &log).failing_after())];

        let resolution = evaluate_with_hooks(&hooks, hook_context(), &HookHints::new(), false, |_| {
            ResolutionDetail::new(true)
        });

        assert!(!resolution.value);
        assert_eq!(resolution.reason, Some(Reason::Error));
        assert_eq!(
            *log.lock().unwrap(),
            ["a:before", "a:after", "a:error", "a:finally"]
        );
    }
}
