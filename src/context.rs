use serde::{Deserialize, Serialize};

use crate::{AttributeValue, Attributes, ErrorCode, EvaluationError};

/// Name of the targeting key when a context is flattened into a single attribute map.
pub const TARGETING_KEY: &str = "targetingKey";

/// Evaluation context: who (targeting key) and what (attributes) a flag is being evaluated for.
///
/// # Examples
/// ```
/// # use openfeature_contrib::EvaluationContext;
/// let context = EvaluationContext::new()
///     .with_targeting_key("user-1")
///     .with_attribute("country", "NL")
///     .with_attribute("age", 42);
/// assert_eq!(context.targeting_key(), Some("user-1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting_key: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl EvaluationContext {
    pub fn new() -> EvaluationContext {
        EvaluationContext::default()
    }

    pub fn with_targeting_key(mut self, targeting_key: impl Into<String>) -> Self {
        self.targeting_key = Some(targeting_key.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Targeting key, treating an empty string as absent.
    pub fn targeting_key(&self) -> Option<&str> {
        self.targeting_key.as_deref().filter(|it| !it.is_empty())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.targeting_key().is_none() && self.attributes.is_empty()
    }

    /// Flatten into a single JSON object: all attributes plus `targetingKey`.
    ///
    /// A `targetingKey` attribute is shadowed by the real targeting key when one is set.
    pub fn flatten(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut flat = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        if let Some(targeting_key) = self.targeting_key() {
            flat.insert(TARGETING_KEY.to_owned(), targeting_key.into());
        }
        flat
    }

    /// Inverse of [`EvaluationContext::flatten`].
    pub fn from_flattened(
        flat: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<EvaluationContext, EvaluationError> {
        let mut context = EvaluationContext::new();
        for (key, value) in flat {
            if key == TARGETING_KEY {
                match value {
                    serde_json::Value::String(s) => context.targeting_key = Some(s.clone()),
                    serde_json::Value::Null => {}
                    _ => {
                        return Err(EvaluationError::new(
                            ErrorCode::InvalidContext,
                            "targetingKey must be a string",
                        ))
                    }
                }
            } else {
                context
                    .attributes
                    .insert(key.clone(), AttributeValue::from_json(value));
            }
        }
        Ok(context)
    }

    /// Merge contexts with first-wins precedence.
    ///
    /// The targeting key is the first non-empty one. Each attribute takes its value from the first
    /// context that defines it.
    pub fn merge<'a>(contexts: impl IntoIterator<Item = &'a EvaluationContext>) -> EvaluationContext {
        let mut merged = EvaluationContext::new();
        for context in contexts {
            if merged.targeting_key().is_none() {
                if let Some(targeting_key) = context.targeting_key() {
                    merged.targeting_key = Some(targeting_key.to_owned());
                }
            }
            for (name, value) in &context.attributes {
                merged
                    .attributes
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        merged
    }

    /// Deterministic serialization used to build cache keys.
    pub(crate) fn canonical_bytes(&self) -> Vec<u8> {
        // Attributes are a BTreeMap, so the flattened form is already sorted.
        serde_json::to_vec(&self.flatten()).unwrap_or_default()
    }
}
