//! Flags defined as JSON documents in environment variables.
//!
//! A flag variable holds a document of the following shape:
//!
//! ```json
//! {
//!   "defaultVariant": "off",
//!   "variants": [
//!     { "name": "on", "value": true, "criteria": [{ "key": "plan", "value": "pro" }] },
//!     { "name": "off", "value": false }
//!   ]
//! }
//! ```
use std::sync::Arc;

use serde::Deserialize;

use crate::{
    config::{self, ConfigLookup, ProcessEnv},
    ErrorCode, EvaluationContext, EvaluationError, FeatureProvider, FlagValue, ProviderMetadata,
    Reason, ResolutionDetail, Result,
};

/// Maps a flag key to the name of the variable holding the flag.
pub type KeyMapper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Configuration of [`EnvVarProvider`].
#[derive(Clone, Default)]
pub struct EnvVarProviderConfig {
    prefix: Option<String>,
    key_mapper: Option<KeyMapper>,
}

impl EnvVarProviderConfig {
    pub fn new() -> EnvVarProviderConfig {
        EnvVarProviderConfig::default()
    }

    /// Load configuration from the process environment.
    ///
    /// Reads `ENV_PROVIDER_PREFIX`.
    pub fn from_env() -> Result<EnvVarProviderConfig> {
        EnvVarProviderConfig::from_lookup(&ProcessEnv)
    }

    pub fn from_lookup(lookup: &impl ConfigLookup) -> Result<EnvVarProviderConfig> {
        Ok(EnvVarProviderConfig {
            prefix: config::var(lookup, "ENV_PROVIDER_PREFIX"),
            key_mapper: None,
        })
    }

    /// String prepended to every mapped flag key.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Transform applied to flag keys before the prefix is added. Defaults to the identity.
    pub fn key_mapper(mut self, mapper: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.key_mapper = Some(Arc::new(mapper));
        self
    }

    fn variable_name(&self, flag_key: &str) -> String {
        let mapped = match &self.key_mapper {
            Some(mapper) => mapper(flag_key),
            None => flag_key.to_owned(),
        };
        match &self.prefix {
            Some(prefix) => format!("{prefix}{mapped}"),
            None => mapped,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlagDefinition {
    default_variant: Option<String>,
    #[serde(default)]
    variants: Vec<VariantDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantDefinition {
    name: String,
    value: serde_json::Value,
    #[serde(default)]
    targeting_key: Option<String>,
    #[serde(default)]
    criteria: Vec<Criterion>,
}

#[derive(Debug, Deserialize)]
struct Criterion {
    key: String,
    value: serde_json::Value,
}

impl VariantDefinition {
    /// A variant without targeting key and criteria is never a targeting match. It can only be
    /// served as the default variant.
    fn matches(&self, context: &EvaluationContext) -> bool {
        if self.targeting_key.is_none() && self.criteria.is_empty() {
            return false;
        }
        if let Some(targeting_key) = &self.targeting_key {
            if context.targeting_key() != Some(targeting_key.as_str()) {
                return false;
            }
        }
        self.criteria.iter().all(|criterion| {
            context
                .attribute(&criterion.key)
                .is_some_and(|attribute| attribute.matches_json(&criterion.value))
        })
    }
}

/// Provider that reads flag definitions from environment variables on every evaluation.
///
/// # Examples
/// ```
/// # use openfeature_contrib::{EvaluationContext, FeatureProvider, Reason};
/// # use openfeature_contrib::providers::{EnvVarProvider, EnvVarProviderConfig};
/// let provider = EnvVarProvider::with_lookup(
///     EnvVarProviderConfig::new().prefix("FLAG_"),
///     |name: &str| {
///         (name == "FLAG_dark-mode")
///             .then(|| r#"{"defaultVariant":"on","variants":[{"name":"on","value":true}]}"#.to_owned())
///     },
/// );
/// let detail = provider.resolve_boolean_value("dark-mode", false, &EvaluationContext::new());
/// assert!(detail.value);
/// assert_eq!(detail.reason, Some(Reason::Default));
/// ```
pub struct EnvVarProvider {
    config: EnvVarProviderConfig,
    lookup: Box<dyn ConfigLookup + Send + Sync>,
}

impl EnvVarProvider {
    /// Create a provider reading the process environment.
    pub fn new(config: EnvVarProviderConfig) -> EnvVarProvider {
        EnvVarProvider::with_lookup(config, ProcessEnv)
    }

    /// Create a provider reading variables through `lookup`.
    pub fn with_lookup(
        config: EnvVarProviderConfig,
        lookup: impl ConfigLookup + Send + Sync + 'static,
    ) -> EnvVarProvider {
        EnvVarProvider {
            config,
            lookup: Box::new(lookup),
        }
    }

    fn evaluate<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        let variable = self.config.variable_name(flag_key);
        let Some(raw) = self.lookup.lookup(&variable) else {
            return ResolutionDetail::from_error(
                default_value,
                EvaluationError::flag_not_found(flag_key),
            );
        };

        let flag = match serde_json::from_str::<FlagDefinition>(&raw) {
            Ok(flag) => flag,
            Err(err) => {
                log::debug!(target: "openfeature", flag_key, variable = variable.as_str(); "failed to parse flag definition: {}", err);
                return ResolutionDetail::from_error(
                    default_value,
                    EvaluationError::new(
                        ErrorCode::ParseError,
                        format!("variable {variable} does not hold a valid flag definition: {err}"),
                    ),
                );
            }
        };

        let (variant, reason) = match flag.variants.iter().find(|it| it.matches(context)) {
            Some(variant) => (variant, Reason::TargetingMatch),
            None => {
                let default_variant = flag.default_variant.as_deref().and_then(|name| {
                    flag.variants.iter().find(|variant| variant.name == name)
                });
                match default_variant {
                    Some(variant) => (variant, Reason::Default),
                    None => {
                        return ResolutionDetail::from_error(
                            default_value,
                            EvaluationError::general(format!(
                                "default variant of flag {flag_key:?} is not defined"
                            )),
                        )
                    }
                }
            }
        };

        match T::from_json(&variant.value) {
            Some(value) => ResolutionDetail::new(value)
                .with_variant(variant.name.clone())
                .with_reason(reason),
            None => ResolutionDetail::from_error(
                default_value,
                EvaluationError::new(
                    ErrorCode::TypeMismatch,
                    format!("variant {:?} is not of type {}", variant.name, T::TYPE),
                ),
            ),
        }
    }
}

impl FeatureProvider for EnvVarProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new("Environment Variable Provider")
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

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::{EnvVarProvider, EnvVarProviderConfig};
    use crate::{ErrorCode, EvaluationContext, FeatureProvider, Reason};

    fn provider(config: EnvVarProviderConfig, vars: &[(&str, serde_json::Value)]) -> EnvVarProvider {
        let vars = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        EnvVarProvider::with_lookup(config, move |name: &str| vars.get(name).cloned())
    }

    fn checkout() -> serde_json::Value {
        json!({
            "defaultVariant": "control",
            "variants": [
                {"name": "alice", "value": "beta", "targetingKey": "alice"},
                {"name": "dutch", "value": "localized", "criteria": [
                    {"key": "country", "value": "NL"},
                    {"key": "age", "value": 30}
                ]},
                {"name": "control", "value": "classic"}
            ]
        })
    }

    #[test]
    fn field_mapping() {
        let provider = provider(
            EnvVarProviderConfig::new(),
            &[
                ("checkout", checkout()),
                ("no-default", json!({"variants": [{"name": "a", "value": 1}]})),
            ],
        );
        let dutch = EvaluationContext::new()
            .with_attribute("country", "NL")
            .with_attribute("age", 30);

        struct Case {
            flag: &'static str,
            context: EvaluationContext,
            value: &'static str,
            variant: Option<&'static str>,
            reason: Reason,
            error: Option<ErrorCode>,
        }
        let cases = [
            Case {
                flag: "checkout",
                context: EvaluationContext::new().with_targeting_key("alice"),
                value: "beta",
                variant: Some("alice"),
                reason: Reason::TargetingMatch,
                error: None,
            },
            Case {
                flag: "checkout",
                context: dutch,
                value: "localized",
                variant: Some("dutch"),
                reason: Reason::TargetingMatch,
                error: None,
            },
            Case {
                flag: "checkout",
                context: EvaluationContext::new().with_attribute("country", "NL"),
                value: "classic",
                variant: Some("control"),
                reason: Reason::Default,
                error: None,
            },
            Case {
                flag: "missing",
                context: EvaluationContext::new(),
                value: "fallback",
                variant: None,
                reason: Reason::Error,
                error: Some(ErrorCode::FlagNotFound),
            },
            Case {
                flag: "no-default",
                context: EvaluationContext::new(),
                value: "fallback",
                variant: None,
                reason: Reason::Error,
                error: Some(ErrorCode::General),
            },
        ];

        for case in cases {
            let detail =
                provider.resolve_string_value(case.flag, "fallback".to_owned(), &case.context);
            assert_eq!(detail.value, case.value, "{}", case.flag);
            assert_eq!(detail.variant.as_deref(), case.variant, "{}", case.flag);
            assert_eq!(detail.reason, Some(case.reason), "{}", case.flag);
            assert_eq!(detail.error_code(), case.error, "{}", case.flag);
        }
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let provider = EnvVarProvider::with_lookup(EnvVarProviderConfig::new(), |_: &str| {
            Some("{not json".to_owned())
        });

        let detail = provider.resolve_boolean_value("flag", true, &EvaluationContext::new());

        assert!(detail.value);
        assert_eq!(detail.error_code(), Some(ErrorCode::ParseError));
    }

    #[test]
    fn wrong_type_is_a_type_mismatch() {
        let provider = provider(EnvVarProviderConfig::new(), &[("checkout", checkout())]);

        let detail = provider.resolve_integer_value("checkout", 7, &EvaluationContext::new());

        assert_eq!(detail.value, 7);
        assert_eq!(detail.error_code(), Some(ErrorCode::TypeMismatch));
    }

    #[test]
    fn variable_names_use_mapper_and_prefix() {
        let provider = provider(
            EnvVarProviderConfig::from_lookup(&|name: &str| {
                (name == "ENV_PROVIDER_PREFIX").then(|| "FF_".to_owned())
            })
            .unwrap()
            .key_mapper(|key| key.to_uppercase().replace('-', "_")),
            &[("FF_NEW_CHECKOUT", checkout())],
        );

        let detail =
            provider.resolve_object_value("new-checkout", json!(null), &EvaluationContext::new());

        assert_eq!(detail.value, json!("classic"));
    }
}
