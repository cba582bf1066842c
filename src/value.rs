// 🧱 Value Model - Typed attribute values
//
// Remote records and local objects speak the same value vocabulary.
// Field access is an explicit map lookup, never runtime introspection:
// classification against the schema catalog is a set-membership check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ATTRIBUTE VALUES
// ============================================================================

/// A plain (non-reference) field value.
///
/// Serde-serializable so sessions can persist whole field maps as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// Raw blob payload (images, archived documents, ...)
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Structured payload that has no dedicated variant
    Json(serde_json::Value),
}

impl AttributeValue {
    /// Short type tag, used in logs and audit events
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Text(_) => "text",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Real(_) => "real",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Bytes(_) => "bytes",
            AttributeValue::Timestamp(_) => "timestamp",
            AttributeValue::Json(_) => "json",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            AttributeValue::Real(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Real(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

// ============================================================================
// REMOTE FIELD VALUES
// ============================================================================

/// A field as it arrives on a remote record: either a plain value, or a
/// reference naming another record by its external identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Value(AttributeValue),
    /// External identifier of the referenced record (target type comes
    /// from the schema catalog, not from the wire)
    Reference(String),
}

impl FieldValue {
    pub fn reference(external_id: impl Into<String>) -> Self {
        FieldValue::Reference(external_id.into())
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldValue::Reference(_))
    }

    pub fn as_value(&self) -> Option<&AttributeValue> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<AttributeValue> for FieldValue {
    fn from(v: AttributeValue) -> Self {
        FieldValue::Value(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Value(AttributeValue::from(s))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Value(AttributeValue::from(s))
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Value(AttributeValue::from(n))
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Value(AttributeValue::from(n))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Value(AttributeValue::from(b))
    }
}

// ============================================================================
// TESTS
// ============================================================================
