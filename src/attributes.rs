use std::collections::BTreeMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for an ordered map of context attributes.
///
/// Keys are attribute names. The map is ordered so that serializing the same attributes always
/// yields the same bytes (used for cache keys).
///
/// # Examples
/// ```
/// # use openfeature_contrib::{Attributes, AttributeValue};
/// let attributes = [
///     ("age".to_owned(), 30.into()),
///     ("is_premium_member".to_owned(), true.into()),
///     ("username".to_owned(), "john_doe".into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Enum representing possible values of an evaluation context attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `i64`, `i32`, `f64`, and
/// `bool` types.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A null value or absence of value.
    Null,
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    String(String),
    /// A list of values.
    List(Vec<AttributeValue>),
    /// A nested structure.
    Struct(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        if let AttributeValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Convert into a JSON value. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Boolean(b) => (*b).into(),
            AttributeValue::Integer(i) => (*i).into(),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::String(s) => s.clone().into(),
            AttributeValue::List(items) => items.iter().map(AttributeValue::to_json).collect(),
            AttributeValue::Struct(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> AttributeValue {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Integer(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => AttributeValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                AttributeValue::List(items.iter().map(AttributeValue::from_json).collect())
            }
            serde_json::Value::Object(fields) => AttributeValue::Struct(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Compare with a JSON value, treating integers and floats of the same magnitude as equal.
    pub(crate) fn matches_json(&self, value: &serde_json::Value) -> bool {
        match (self, value) {
            (AttributeValue::Integer(a), serde_json::Value::Number(b)) => {
                b.as_i64() == Some(*a) || b.as_f64() == Some(*a as f64)
            }
            (AttributeValue::Float(a), serde_json::Value::Number(b)) => b.as_f64() == Some(*a),
            _ => &self.to_json() == value,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}
