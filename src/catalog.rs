// 📐 Schema Catalog - Locally mirrored entity shapes
//
// The catalog is the single source of truth for which record types are
// mirrored locally, which of their fields are plain attributes, and which
// are relationships (and to what target type).
//
// A record type with no catalog entry is OUTSIDE the mirrored schema:
// reconciling such a record is a silent no-op, never an error.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// FIELD CLASSIFICATION
// ============================================================================

/// How a single incoming field relates to an entity shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind<'a> {
    /// Plain attribute, applied as-is
    Attribute,
    /// Relationship; value must be resolved against the target type's index
    Relationship { target_type: &'a str },
    /// Not part of the shape at all; dropped during reconciliation
    Unknown,
}

// ============================================================================
// ENTITY SHAPE
// ============================================================================

/// Per-type catalog entry: attribute names plus relationship targets.
///
/// Read-only to the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityShape {
    /// Entity type name (e.g. "Task")
    pub name: String,

    /// Plain attribute field names
    pub attributes: HashSet<String>,

    /// Relationship field name -> target entity type name
    pub relationships: HashMap<String, String>,
}

impl EntityShape {
    pub fn new(name: impl Into<String>) -> Self {
        EntityShape {
            name: name.into(),
            attributes: HashSet::new(),
            relationships: HashMap::new(),
        }
    }

    /// Builder: declare a plain attribute field
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    /// Builder: declare a relationship field and its target entity type
    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        self.relationships.insert(name.into(), target_type.into());
        self
    }

    /// Classify one field name against this shape.
    ///
    /// Relationships win over attributes if a name is (mis)declared as
    /// both; a field matching neither set is Unknown and gets dropped.
    pub fn classify(&self, field: &str) -> FieldKind<'_> {
        if let Some(target) = self.relationships.get(field) {
            FieldKind::Relationship { target_type: target }
        } else if self.attributes.contains(field) {
            FieldKind::Attribute
        } else {
            FieldKind::Unknown
        }
    }
}

// ============================================================================
// SCHEMA CATALOG
// ============================================================================

/// Catalog of all locally mirrored entity shapes, keyed by type name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    entities: HashMap<String, EntityShape>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        SchemaCatalog {
            entities: HashMap::new(),
        }
    }

    /// Builder: register an entity shape
    pub fn with_entity(mut self, shape: EntityShape) -> Self {
        self.register(shape);
        self
    }

    /// Register (or replace) an entity shape
    pub fn register(&mut self, shape: EntityShape) {
        self.entities.insert(shape.name.clone(), shape);
    }

    /// Look up the shape for a record type; None means "not mirrored here"
    pub fn entity(&self, type_name: &str) -> Option<&EntityShape> {
        self.entities.get(type_name)
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn task_project_catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .with_entity(
                EntityShape::new("Task")
                    .with_attribute("title")
                    .with_attribute("due_date")
                    .with_relationship("project", "Project"),
            )
            .with_entity(EntityShape::new("Project").with_attribute("name"))
    }

    #[test]
    fn test_entity_lookup() {
        let catalog = task_project_catalog();

        assert!(catalog.entity("Task").is_some());
        assert!(catalog.entity("Project").is_some());
        assert!(catalog.entity("Invoice").is_none());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_classify_attribute() {
        let catalog = task_project_catalog();
        let task = catalog.entity("Task").unwrap();

        assert_eq!(task.classify("title"), FieldKind::Attribute);
        assert_eq!(task.classify("due_date"), FieldKind::Attribute);
    }

    #[test]
    fn test_classify_relationship() {
        let catalog = task_project_catalog();
        let task = catalog.entity("Task").unwrap();

        assert_eq!(
            task.classify("project"),
            FieldKind::Relationship {
                target_type: "Project"
            }
        );
    }

    #[test]
    fn test_classify_unknown_field() {
        let catalog = task_project_catalog();
        let task = catalog.entity("Task").unwrap();

        assert_eq!(task.classify("color"), FieldKind::Unknown);
    }

    #[test]
    fn test_relationship_wins_over_attribute() {
        // A field declared as both classifies as a relationship
        let shape = EntityShape::new("Task")
            .with_attribute("project")
            .with_relationship("project", "Project");

        assert_eq!(
            shape.classify("project"),
            FieldKind::Relationship {
                target_type: "Project"
            }
        );
    }

    #[test]
    fn test_register_replaces_shape() {
        let mut catalog = task_project_catalog();
        catalog.register(EntityShape::new("Task").with_attribute("title"));

        let task = catalog.entity("Task").unwrap();
        assert_eq!(task.classify("project"), FieldKind::Unknown);
        assert_eq!(catalog.len(), 2);
    }
}
