//! Typed attribute values with a raw fallback.

use serde_json::Value;

/// A device or event attribute value.
///
/// The hubs push loosely-typed JSON; known scalar shapes are coerced to
/// typed variants and anything else lands in `Raw` instead of being
/// rejected, so protocol evolution never drops data.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Raw(Value),
}

impl AttributeValue {
    /// Coerces a JSON value into the closest typed variant.
    pub fn coerce(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Raw(value.clone()),
            },
            Value::String(s) => Self::Text(s.clone()),
            _ => Self::Raw(value.clone()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&Value> for AttributeValue {
    fn from(value: &Value) -> Self {
        Self::coerce(value)
    }
}
