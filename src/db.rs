// 💾 SQLite Session - Durable persistence backend
//
// Staged-write unit of work over a single rusqlite connection. The
// `(entity_type, external_id)` UNIQUE constraint is the store-level
// backstop for the convergence invariant: one matching key, one row.
//
// Every committed creation and field application is also appended to an
// `events` audit table, so the provenance of each merge survives.

use crate::catalog::SchemaCatalog;
use crate::error::{LookupError, StoreError};
use crate::object::{LocalId, LocalObject, PersistedValue};
use crate::session::{ExternalIdIndex, PersistenceSession, SessionStats};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Append-only audit record for one committed mutation
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    /// "object_created" or "fields_applied"
    pub event_type: String,
    pub entity_type: String,
    pub external_id: String,
    pub data: serde_json::Value,
}

// ============================================================================
// SCHEMA SETUP
// ============================================================================

fn setup_schema(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS local_objects (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            external_id TEXT NOT NULL,
            fields TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(entity_type, external_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            external_id TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_objects_external_id
         ON local_objects(entity_type, external_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_object
         ON events(entity_type, external_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SQLITE SESSION
// ============================================================================

/// Staged object plus whether this session created it (drives the audit
/// event type and the created-vs-updated distinction in reports)
struct StagedObject {
    object: LocalObject,
    created: bool,
}

/// rusqlite-backed persistence session.
///
/// `find` queries committed rows only; staged objects become visible to
/// the index at commit. A failed commit rolls the transaction back and
/// discards the staged state.
pub struct SqliteSession {
    conn: Connection,
    catalog: SchemaCatalog,
    pending: HashMap<LocalId, StagedObject>,
    stats: SessionStats,
}

impl SqliteSession {
    pub fn open(path: &Path, catalog: SchemaCatalog) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open local store")?;
        setup_schema(&conn)?;
        Ok(SqliteSession {
            conn,
            catalog,
            pending: HashMap::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn open_in_memory(catalog: SchemaCatalog) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        setup_schema(&conn)?;
        Ok(SqliteSession {
            conn,
            catalog,
            pending: HashMap::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Committed object count
    pub fn object_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM local_objects", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Audit trail for one object's matching key, newest first
    pub fn events_for_object(&self, entity_type: &str, external_id: &str) -> Result<Vec<AuditEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, external_id, data
             FROM events
             WHERE entity_type = ?1 AND external_id = ?2
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, external_id], |row| {
                let timestamp_str: String = row.get(1)?;
                let data_json: String = row.get(5)?;

                Ok(AuditEvent {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?
                        .with_timezone(&Utc),
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    external_id: row.get(4)?,
                    data: serde_json::from_str(&data_json)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn load_committed(&self, id: LocalId) -> std::result::Result<Option<LocalObject>, LookupError> {
        let row = self
            .conn
            .query_row(
                "SELECT entity_type, external_id, fields, created_at, updated_at
                 FROM local_objects WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(LookupError::from)?;

        let Some((entity_type, external_id, fields_json, created_str, updated_str)) = row else {
            return Ok(None);
        };

        let fields: HashMap<String, PersistedValue> = serde_json::from_str(&fields_json)
            .map_err(|e| LookupError::Query(format!("corrupt fields column: {}", e)))?;

        let parse_ts = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| LookupError::Query(format!("corrupt timestamp column: {}", e)))
        };

        Ok(Some(LocalObject {
            id,
            entity_type,
            external_id,
            fields,
            created_at: parse_ts(&created_str)?,
            updated_at: parse_ts(&updated_str)?,
        }))
    }
}

impl ExternalIdIndex for SqliteSession {
    fn find(
        &self,
        entity_type: &str,
        external_id: &str,
    ) -> std::result::Result<Option<LocalId>, LookupError> {
        let id_str: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM local_objects WHERE entity_type = ?1 AND external_id = ?2 LIMIT 1",
                params![entity_type, external_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(LookupError::from)?;

        match id_str {
            Some(s) => Ok(Some(LocalId(uuid::Uuid::parse_str(&s).map_err(|e| {
                LookupError::Query(format!("corrupt id column: {}", e))
            })?))),
            None => Ok(None),
        }
    }
}

impl PersistenceSession for SqliteSession {
    fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    fn create_object(&mut self, entity_type: &str, external_id: &str) -> LocalId {
        let object = LocalObject::new(entity_type, external_id);
        let id = object.id;
        self.pending.insert(id, StagedObject { object, created: true });
        id
    }

    fn set_fields(&mut self, id: LocalId, fields: HashMap<String, PersistedValue>) {
        let (mut object, created) = match self.pending.get(&id) {
            Some(staged) => (staged.object.clone(), staged.created),
            None => match self.load_committed(id) {
                Ok(Some(obj)) => (obj, false),
                Ok(None) => {
                    tracing::warn!(%id, "set_fields on unknown object handle, ignoring");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "set_fields could not load object, ignoring");
                    return;
                }
            },
        };

        // A freshly created object stays pending even with an empty diff
        let mut changed = self.pending.contains_key(&id);

        for (name, value) in fields {
            if object.fields.get(&name) != Some(&value) {
                object.fields.insert(name, value);
                changed = true;
            }
        }

        if changed {
            object.updated_at = Utc::now();
            self.pending.insert(id, StagedObject { object, created });
        }
    }

    fn get_object(&self, id: LocalId) -> Option<LocalObject> {
        if let Some(staged) = self.pending.get(&id) {
            return Some(staged.object.clone());
        }
        self.load_committed(id).ok().flatten()
    }

    fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn commit(&mut self) -> std::result::Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.pending);

        let result = (|| -> std::result::Result<u64, StoreError> {
            let tx = self.conn.transaction()?;
            let mut written = 0u64;

            for staged in pending.values() {
                let obj = &staged.object;
                let fields_json = serde_json::to_string(&obj.fields)?;

                tx.execute(
                    "INSERT INTO local_objects (id, entity_type, external_id, fields, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                         fields = excluded.fields,
                         updated_at = excluded.updated_at",
                    params![
                        obj.id.to_string(),
                        obj.entity_type,
                        obj.external_id,
                        fields_json,
                        obj.created_at.to_rfc3339(),
                        obj.updated_at.to_rfc3339(),
                    ],
                )?;

                let event_type = if staged.created { "object_created" } else { "fields_applied" };
                tx.execute(
                    "INSERT INTO events (event_id, timestamp, event_type, entity_type, external_id, data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        Utc::now().to_rfc3339(),
                        event_type,
                        obj.entity_type,
                        obj.external_id,
                        serde_json::to_string(&serde_json::json!({
                            "field_count": obj.fields.len(),
                        }))?,
                    ],
                )?;

                written += 1;
            }

            tx.commit()?;
            Ok(written)
        })();

        // Staged state is gone either way: on success it is durable, on
        // failure the transaction rolled back and retry belongs to the
        // caller-level transport, not this session.
        match result {
            Ok(written) => {
                self.stats.commits += 1;
                self.stats.objects_written += written;
                tracing::debug!(objects = written, "session commit applied");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "session commit failed, staged state discarded");
                Err(e)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityShape;
    use crate::value::AttributeValue;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new().with_entity(
            EntityShape::new("Task")
                .with_attribute("title")
                .with_relationship("project", "Project"),
        )
    }

    fn title(value: &str) -> HashMap<String, PersistedValue> {
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), AttributeValue::from(value).into());
        fields
    }

    #[test]
    fn test_create_commit_find_roundtrip() {
        let mut session = SqliteSession::open_in_memory(catalog()).unwrap();

        let id = session.create_object("Task", "T1");
        session.set_fields(id, title("Buy milk"));

        // Invisible to the index until commit
        assert_eq!(session.find("Task", "T1").unwrap(), None);

        session.commit().unwrap();
        assert_eq!(session.find("Task", "T1").unwrap(), Some(id));

        let obj = session.get_object(id).unwrap();
        assert_eq!(obj.attribute("title").and_then(|v| v.as_text()), Some("Buy milk"));
        assert_eq!(obj.entity_type, "Task");
        assert_eq!(obj.external_id, "T1");
    }

    #[test]
    fn test_noop_set_leaves_session_clean() {
        let mut session = SqliteSession::open_in_memory(catalog()).unwrap();

        let id = session.create_object("Task", "T1");
        session.set_fields(id, title("Buy milk"));
        session.commit().unwrap();

        session.set_fields(id, title("Buy milk"));
        assert!(!session.has_pending_changes());

        // Commit with nothing staged is a no-op, not a store write
        session.commit().unwrap();
        assert_eq!(session.stats().commits, 1);
        assert_eq!(session.stats().objects_written, 1);
    }

    #[test]
    fn test_link_values_survive_storage() {
        let mut session = SqliteSession::open_in_memory(catalog()).unwrap();

        let project = session.create_object("Project", "P1");
        let task = session.create_object("Task", "T1");
        let mut fields = title("Buy milk");
        fields.insert("project".to_string(), project.into());
        session.set_fields(task, fields);
        session.commit().unwrap();

        let obj = session.get_object(task).unwrap();
        assert_eq!(obj.link("project"), Some(project));
    }

    #[test]
    fn test_unique_index_rejects_duplicate_key() {
        let mut session = SqliteSession::open_in_memory(catalog()).unwrap();

        session.create_object("Task", "T1");
        session.commit().unwrap();

        // Bypassing find-before-create violates the matching-key invariant
        // and the store-level constraint catches it
        session.create_object("Task", "T1");
        let err = session.commit().unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));

        // Failed commit discarded the staged duplicate
        assert!(!session.has_pending_changes());
        assert_eq!(session.object_count().unwrap(), 1);
    }

    #[test]
    fn test_audit_events_recorded() {
        let mut session = SqliteSession::open_in_memory(catalog()).unwrap();

        let id = session.create_object("Task", "T1");
        session.set_fields(id, title("Buy milk"));
        session.commit().unwrap();

        session.set_fields(id, title("Buy bread"));
        session.commit().unwrap();

        let events = session.events_for_object("Task", "T1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "fields_applied");
        assert_eq!(events[1].event_type, "object_created");
    }

    #[test]
    fn test_same_key_different_type_is_distinct() {
        let mut session = SqliteSession::open_in_memory(catalog()).unwrap();

        let a = session.create_object("Task", "X1");
        let b = session.create_object("Project", "X1");
        session.commit().unwrap();

        assert_eq!(session.find("Task", "X1").unwrap(), Some(a));
        assert_eq!(session.find("Project", "X1").unwrap(), Some(b));
    }
}
