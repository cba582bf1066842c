// 📨 Remote Record - Incoming unit of data
//
// A remote record is a typed attribute bag plus reference fields naming
// other records by external identifier. It is immutable for the duration
// of one reconciliation call; the reconciler only reads it.

use crate::value::{AttributeValue, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// REMOTE RECORD
// ============================================================================

/// Incoming record to merge into the local object graph.
///
/// `external_id` is the stable correlation key: unique within
/// `record_type`, and the SOLE matching key against local objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Entity type name, resolved against the schema catalog
    pub record_type: String,

    /// Stable external identifier, unique within the record type
    pub external_id: String,

    /// Field name -> plain value or reference-by-external-id
    pub fields: HashMap<String, FieldValue>,
}

impl RemoteRecord {
    pub fn new(record_type: impl Into<String>, external_id: impl Into<String>) -> Self {
        RemoteRecord {
            record_type: record_type.into(),
            external_id: external_id.into(),
            fields: HashMap::new(),
        }
    }

    /// Builder: set a plain attribute field
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.fields.insert(name.into(), FieldValue::Value(value.into()));
        self
    }

    /// Builder: set a reference field naming another record's external id
    pub fn with_reference(
        mut self,
        name: impl Into<String>,
        target_external_id: impl Into<String>,
    ) -> Self {
        self.fields
            .insert(name.into(), FieldValue::Reference(target_external_id.into()));
        self
    }

    /// Field names carrying references (target types live in the catalog)
    pub fn reference_fields(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter().filter_map(|(name, value)| match value {
            FieldValue::Reference(ext_id) => Some((name, ext_id)),
            _ => None,
        })
    }

    /// Field names carrying plain values
    pub fn value_fields(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.fields.iter().filter_map(|(name, value)| match value {
            FieldValue::Value(v) => Some((name, v)),
            _ => None,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let record = RemoteRecord::new("Task", "T1")
            .with_value("title", "Buy milk")
            .with_value("priority", 2i64)
            .with_reference("project", "P1");

        assert_eq!(record.record_type, "Task");
        assert_eq!(record.external_id, "T1");
        assert_eq!(record.fields.len(), 3);
    }

    #[test]
    fn test_field_partitioning() {
        let record = RemoteRecord::new("Task", "T1")
            .with_value("title", "Buy milk")
            .with_reference("project", "P1");

        let refs: Vec<_> = record.reference_fields().collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0, "project");
        assert_eq!(refs[0].1, "P1");

        let values: Vec<_> = record.value_fields().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0, "title");
    }

    #[test]
    fn test_later_field_wins() {
        let record = RemoteRecord::new("Task", "T1")
            .with_value("title", "first")
            .with_value("title", "second");

        assert_eq!(record.fields.len(), 1);
        assert_eq!(
            record.fields["title"].as_value().and_then(|v| v.as_text()),
            Some("second")
        );
    }
}
