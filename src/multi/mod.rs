//! A provider that combines several providers under one [`Strategy`].
//!
//! Each member is wrapped in a [`HookIsolator`], so a member's hooks only ever observe and
//! modify the evaluation context of that member's own evaluation.
use std::{collections::HashSet, sync::Arc};

use crate::{
    hooks::Hook, EvaluationContext, EvaluationError, FeatureProvider, FlagValue,
    ProviderMetadata, ProviderStatus, ResolutionDetail, Error, Result,
};

mod isolation;
mod strategy;

pub use isolation::HookIsolator;
pub use strategy::{ComparisonStrategy, MismatchCallback, ProviderResolution, Strategy};

use strategy::Member;

/// Flag metadata key holding the name of the provider whose result was returned.
pub const PROVIDER_NAME_METADATA_KEY: &str = "multiprovider.provider";

/// A member provider, optionally with an explicit unique name.
pub struct ProviderEntry {
    pub provider: Arc<dyn FeatureProvider>,
    pub name: Option<String>,
}

impl ProviderEntry {
    pub fn new(provider: impl FeatureProvider + 'static) -> ProviderEntry {
        ProviderEntry {
            provider: Arc::new(provider),
            name: None,
        }
    }

    pub fn from_provider(provider: Arc<dyn FeatureProvider>) -> ProviderEntry {
        ProviderEntry {
            provider,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

pub(crate) struct NamedProvider {
    pub(crate) name: String,
    pub(crate) isolator: Arc<HookIsolator>,
}

/// Evaluates flags against several providers.
///
/// # Examples
/// ```
/// # use openfeature_contrib::multi::{MultiProvider, ProviderEntry, Strategy};
/// # use openfeature_contrib::providers::{InMemoryFlag, InMemoryProvider};
/// let overrides = InMemoryProvider::new([(
///     "new-checkout".to_owned(),
///     InMemoryFlag::new("on", [("on", true)]),
/// )]);
/// let multi = MultiProvider::new(
///     [
///         ProviderEntry::new(overrides).with_name("overrides"),
///         ProviderEntry::new(InMemoryProvider::default()).with_name("remote"),
///     ],
///     Strategy::FirstMatch,
/// )
/// .unwrap();
/// assert_eq!(multi.provider_names(), ["overrides", "remote"]);
/// ```
pub struct MultiProvider {
    providers: Vec<NamedProvider>,
    strategy: Strategy,
}

impl MultiProvider {
    /// Create a multi-provider.
    ///
    /// Members without an explicit name are named after their metadata name, with `-1`, `-2`, ...
    /// suffixes when that name is not unique.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if no providers are given, if two explicit names
    /// are equal, or if the comparison fallback does not name a member.
    pub fn new(
        entries: impl IntoIterator<Item = ProviderEntry>,
        strategy: Strategy,
    ) -> Result<MultiProvider> {
        let entries = entries.into_iter().collect::<Vec<_>>();
        if entries.is_empty() {
            return Err(Error::InvalidConfiguration(
                "multi-provider requires at least one provider".to_owned(),
            ));
        }

        let names = unique_names(&entries)?;
        let providers = entries
            .into_iter()
            .zip(names)
            .map(|(entry, name)| NamedProvider {
                name,
                isolator: HookIsolator::new(entry.provider),
            })
            .collect::<Vec<_>>();

        if let Strategy::Comparison(ComparisonStrategy {
            fallback: Some(fallback),
            ..
        }) = &strategy
        {
            if !providers.iter().any(|it| &it.name == fallback) {
                return Err(Error::InvalidConfiguration(format!(
                    "comparison fallback {fallback:?} is not a member provider"
                )));
            }
        }

        Ok(MultiProvider {
            providers,
            strategy,
        })
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|it| it.name.as_str()).collect()
    }

    fn evaluate<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        // Every member's captured hook state is taken here, including members the strategy
        // never reaches.
        let members = self
            .providers
            .iter()
            .map(|provider| Member {
                captured: provider.isolator.take_captured(flag_key, T::TYPE),
                provider,
            })
            .collect::<Vec<_>>();

        match &self.strategy {
            Strategy::FirstMatch => strategy::first_match(members, flag_key, default_value, context),
            Strategy::FirstSuccess => {
                strategy::first_success(members, flag_key, default_value, context)
            }
            Strategy::Comparison(config) => {
                strategy::comparison(config, members, flag_key, default_value, context)
            }
        }
    }
}

fn unique_names(entries: &[ProviderEntry]) -> Result<Vec<String>> {
    let mut taken = HashSet::new();
    for name in entries.iter().filter_map(|it| it.name.as_ref()) {
        if !taken.insert(name.clone()) {
            return Err(Error::InvalidConfiguration(format!(
                "provider name {name:?} is used more than once"
            )));
        }
    }

    let metadata_names = entries
        .iter()
        .map(|it| it.provider.metadata().name)
        .collect::<Vec<_>>();

    let mut names = Vec::with_capacity(entries.len());
    for (entry, base) in entries.iter().zip(&metadata_names) {
        if let Some(name) = &entry.name {
            names.push(name.clone());
            continue;
        }
        let shared = entries
            .iter()
            .zip(&metadata_names)
            .filter(|(other, other_base)| other.name.is_none() && *other_base == base)
            .count()
            > 1;
        let name = if !shared && !taken.contains(base) {
            base.clone()
        } else {
            (1..)
                .map(|i| format!("{base}-{i}"))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| base.clone())
        };
        taken.insert(name.clone());
        names.push(name);
    }
    Ok(names)
}

impl FeatureProvider for MultiProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new("MultiProvider")
    }

    /// The least healthy status among member providers.
    fn status(&self) -> ProviderStatus {
        self.providers
            .iter()
            .map(|it| it.isolator.status())
            .max()
            .unwrap_or(ProviderStatus::Ready)
    }

    fn initialize(&self, context: &EvaluationContext) -> std::result::Result<(), EvaluationError> {
        let errors = self
            .providers
            .iter()
            .filter_map(|provider| {
                log::debug!(target: "openfeature", provider = provider.name.as_str(); "initializing provider");
                provider
                    .isolator
                    .initialize(context)
                    .err()
                    .map(|err| format!("{}: {}", provider.name, err))
            })
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EvaluationError::general(format!(
                "providers failed to initialize: {}",
                errors.join("; ")
            )))
        }
    }

    fn shutdown(&self) {
        for provider in &self.providers {
            provider.isolator.shutdown();
        }
    }

    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        self.providers
            .iter()
            .map(|it| it.isolator.clone() as Arc<dyn Hook>)
            .collect()
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
