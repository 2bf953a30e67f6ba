use std::sync::Arc;

use crate::{ErrorCode, EvaluationContext, EvaluationError, FlagValue, ResolutionDetail};

use super::{isolation::Captured, NamedProvider, PROVIDER_NAME_METADATA_KEY};

/// One provider's answer, as reported to a [`MismatchCallback`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResolution {
    pub provider_name: String,
    pub resolution: ResolutionDetail<serde_json::Value>,
}

/// Called with the flag key and every provider's result when providers disagree.
pub type MismatchCallback = Arc<dyn Fn(&str, &[ProviderResolution]) + Send + Sync>;

/// How a [`MultiProvider`](super::MultiProvider) picks a result among its providers.
#[derive(Clone)]
pub enum Strategy {
    /// Providers are asked in order. The first result that is not `FLAG_NOT_FOUND` wins, even if
    /// it is an error.
    FirstMatch,
    /// Providers are asked in order. The first error-free result wins.
    FirstSuccess,
    /// All providers are asked concurrently and their values compared.
    Comparison(ComparisonStrategy),
}

/// Configuration of [`Strategy::Comparison`].
#[derive(Clone, Default)]
pub struct ComparisonStrategy {
    pub(crate) fallback: Option<String>,
    pub(crate) on_mismatch: Option<MismatchCallback>,
}

impl ComparisonStrategy {
    pub fn new() -> ComparisonStrategy {
        ComparisonStrategy::default()
    }

    /// Name of the provider whose result is returned. Defaults to the first provider.
    pub fn fallback(mut self, provider_name: impl Into<String>) -> Self {
        self.fallback = Some(provider_name.into());
        self
    }

    pub fn on_mismatch(
        mut self,
        callback: impl Fn(&str, &[ProviderResolution]) + Send + Sync + 'static,
    ) -> Self {
        self.on_mismatch = Some(Arc::new(callback));
        self
    }
}

/// A member provider together with the hook state of the current evaluation.
pub(super) struct Member<'a> {
    pub(super) provider: &'a NamedProvider,
    pub(super) captured: Option<Captured>,
}

impl Member<'_> {
    fn evaluate<T: FlagValue>(
        self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        self.provider
            .isolator
            .evaluate_captured(self.captured, flag_key, default_value, context)
    }
}

fn tagged<T>(detail: ResolutionDetail<T>, provider: &NamedProvider) -> ResolutionDetail<T> {
    detail.with_metadata(PROVIDER_NAME_METADATA_KEY, provider.name.clone())
}

pub(super) fn first_match<T: FlagValue>(
    members: Vec<Member<'_>>,
    flag_key: &str,
    default_value: T,
    context: &EvaluationContext,
) -> ResolutionDetail<T> {
    for member in members {
        let provider = member.provider;
        let detail = member.evaluate(flag_key, default_value.clone(), context);
        if detail.error_code() == Some(ErrorCode::FlagNotFound) {
            continue;
        }
        return tagged(detail, provider);
    }
    ResolutionDetail::from_error(default_value, EvaluationError::flag_not_found(flag_key))
}

pub(super) fn first_success<T: FlagValue>(
    members: Vec<Member<'_>>,
    flag_key: &str,
    default_value: T,
    context: &EvaluationContext,
) -> ResolutionDetail<T> {
    let mut errors = Vec::new();
    for member in members {
        let provider = member.provider;
        let detail = member.evaluate(flag_key, default_value.clone(), context);
        if detail.error.is_none() {
            return tagged(detail, provider);
        }
        if let Some(error) = detail.error {
            errors.push((provider.name.as_str(), error));
        }
    }

    if errors
        .iter()
        .all(|(_, error)| error.code == ErrorCode::FlagNotFound)
    {
        return ResolutionDetail::from_error(default_value, EvaluationError::flag_not_found(flag_key));
    }
    ResolutionDetail::from_error(default_value, aggregate(flag_key, &errors))
}

pub(super) fn comparison<T: FlagValue>(
    config: &ComparisonStrategy,
    members: Vec<Member<'_>>,
    flag_key: &str,
    default_value: T,
    context: &EvaluationContext,
) -> ResolutionDetail<T> {
    let providers = members.iter().map(|it| it.provider).collect::<Vec<_>>();
    let default = &default_value;
    let results = std::thread::scope(|scope| {
        let handles = members
            .into_iter()
            .map(|member| scope.spawn(move || member.evaluate(flag_key, default.clone(), context)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });

    let mut found = Vec::new();
    let mut errors = Vec::new();
    for (provider, result) in providers.into_iter().zip(results) {
        match result {
            Err(_) => errors.push((
                provider.name.as_str(),
                EvaluationError::general("provider panicked"),
            )),
            Ok(detail) => match &detail.error {
                Some(error) if error.code == ErrorCode::FlagNotFound => {}
                Some(error) => errors.push((provider.name.as_str(), error.clone())),
                None => found.push((provider, detail)),
            },
        }
    }

    if !errors.is_empty() {
        return ResolutionDetail::from_error(default_value, aggregate(flag_key, &errors));
    }
    if found.is_empty() {
        return ResolutionDetail::from_error(default_value, EvaluationError::flag_not_found(flag_key));
    }

    let agree = found
        .iter()
        .all(|(_, detail)| detail.value == found[0].1.value);
    if !agree {
        log::warn!(target: "openfeature", flag_key; "providers disagree on flag value");
        if let Some(on_mismatch) = &config.on_mismatch {
            let resolutions = found
                .iter()
                .map(|(provider, detail)| ProviderResolution {
                    provider_name: provider.name.clone(),
                    resolution: detail.to_json(),
                })
                .collect::<Vec<_>>();
            on_mismatch(flag_key, &resolutions);
        }
    }

    let selected = config
        .fallback
        .as_deref()
        .and_then(|name| found.iter().position(|(provider, _)| provider.name == name))
        .unwrap_or(0);
    let (provider, detail) = found.swap_remove(selected);
    tagged(detail, provider)
}

fn aggregate(flag_key: &str, errors: &[(&str, EvaluationError)]) -> EvaluationError {
    let details = errors
        .iter()
        .map(|(name, error)| format!("{name}: {error}"))
        .collect::<Vec<_>>()
        .join("; ");
    log::warn!(target: "openfeature", flag_key; "providers failed to evaluate flag: {}", details);
    EvaluationError::general(format!("providers failed to evaluate flag: {details}"))
}
