// 🗃️ Local Object - The persisted representation
//
// Identity/value separation: `LocalId` is the stable identity (never
// changes), field values can change on every reconciliation. The external
// identifier is a reserved struct field used exclusively for matching
// incoming records; relationship traversal goes through `Link` values
// holding local ids, never through external ids.

use crate::value::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// LOCAL IDENTITY
// ============================================================================

/// Stable handle for a local object. Two reconciliations of the same
/// `(type, external_id)` always land on the same `LocalId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(pub uuid::Uuid);

impl LocalId {
    pub fn generate() -> Self {
        LocalId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// PERSISTED VALUES
// ============================================================================

/// A field value as stored on a local object: either a plain attribute
/// value, or a resolved link to another local object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersistedValue {
    Attribute(AttributeValue),
    Link(LocalId),
}

impl PersistedValue {
    pub fn as_attribute(&self) -> Option<&AttributeValue> {
        match self {
            PersistedValue::Attribute(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<LocalId> {
        match self {
            PersistedValue::Link(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<AttributeValue> for PersistedValue {
    fn from(v: AttributeValue) -> Self {
        PersistedValue::Attribute(v)
    }
}

impl From<LocalId> for PersistedValue {
    fn from(id: LocalId) -> Self {
        PersistedValue::Link(id)
    }
}

// ============================================================================
// LOCAL OBJECT
// ============================================================================

/// Snapshot of one persisted object.
///
/// Owned and persisted by the session; the reconciler only ever mutates it
/// through `set_fields` so change tracking stays in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalObject {
    /// Stable identity, never changes
    pub id: LocalId,

    /// Entity type from the schema catalog
    pub entity_type: String,

    /// Reserved matching key; never used for relationship traversal
    pub external_id: String,

    /// Field name -> current value
    pub fields: HashMap<String, PersistedValue>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalObject {
    pub fn new(entity_type: impl Into<String>, external_id: impl Into<String>) -> Self {
        let now = Utc::now();
        LocalObject {
            id: LocalId::generate(),
            entity_type: entity_type.into(),
            external_id: external_id.into(),
            fields: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attribute value of a field, if set and not a link
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.fields.get(name).and_then(|v| v.as_attribute())
    }

    /// Link target of a field, if set and a link
    pub fn link(&self, name: &str) -> Option<LocalId> {
        self.fields.get(name).and_then(|v| v.as_link())
    }
}

// ============================================================================
// TESTS
// ============================================================================
