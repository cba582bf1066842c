// 🔁 Persistence Session - Transactional unit of work
//
// The session is the sole mutable shared resource of a reconciliation
// batch. It is an explicit, passed-by-reference handle (no ambient/global
// context): `&mut` enforces the single-writer discipline at compile time.
//
// Index visibility rule: `find` only reflects COMMITTED state. An object
// created earlier in the same batch is visible to later records because
// every reconcile call commits before the next one starts.

use crate::catalog::SchemaCatalog;
use crate::error::{LookupError, StoreError};
use crate::object::{LocalId, LocalObject, PersistedValue};
use chrono::Utc;
use std::collections::HashMap;

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Lookup from a stable external identifier to a local object, scoped to
/// one entity type. Read-only from the reconciler's perspective.
pub trait ExternalIdIndex {
    fn find(&self, entity_type: &str, external_id: &str) -> Result<Option<LocalId>, LookupError>;
}

/// Transactional unit of work over the local object store.
///
/// Writes are staged until `commit`; `set_fields` stages only actual
/// changes, so reconciling a record whose computed state already matches
/// the stored object leaves the session clean and the commit is skipped.
pub trait PersistenceSession: ExternalIdIndex {
    /// Schema catalog this session is bound to
    fn catalog(&self) -> &SchemaCatalog;

    /// Stage a new local object of the given type with its reserved
    /// external-identifier field set. Invisible to `find` until committed.
    fn create_object(&mut self, entity_type: &str, external_id: &str) -> LocalId;

    /// Bulk-set fields on an object. Full overwrite of each present field;
    /// fields absent from the map are left untouched. Values equal to the
    /// current state are not staged.
    fn set_fields(&mut self, id: LocalId, fields: HashMap<String, PersistedValue>);

    /// Read-your-writes snapshot: staged state if present, else committed
    fn get_object(&self, id: LocalId) -> Option<LocalObject>;

    fn has_pending_changes(&self) -> bool;

    /// Commit all staged changes. On failure the staged state is discarded
    /// (rollback is the session's responsibility, not the reconciler's).
    fn commit(&mut self) -> Result<(), StoreError>;
}

// ============================================================================
// SESSION STATS
// ============================================================================

/// Call counters, used by tests to verify the commit-skip property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of `commit` calls that reached the store
    pub commits: u64,
    /// Number of objects written across all commits
    pub objects_written: u64,
}

// ============================================================================
// MEMORY SESSION
// ============================================================================

/// In-memory reference session: committed map + staged working copies.
///
/// Mirrors the SQLite session's semantics exactly (index sees committed
/// state only, change-detecting `set_fields`, unique-matching-key
/// backstop at commit, discard-on-failed-commit) and adds
/// failure-injection knobs for exercising the best-effort path.
pub struct MemorySession {
    catalog: SchemaCatalog,

    /// Committed objects by identity
    committed: HashMap<LocalId, LocalObject>,

    /// Committed (entity_type, external_id) -> identity
    index: HashMap<(String, String), LocalId>,

    /// Staged working copies: created objects and modified clones
    pending: HashMap<LocalId, LocalObject>,

    stats: SessionStats,

    /// Test knob: make every `find` fail as if the store were unreachable
    pub fail_lookups: bool,

    /// Test knob: make the next `commit` fail and discard staged state
    pub fail_next_commit: bool,
}

impl MemorySession {
    pub fn new(catalog: SchemaCatalog) -> Self {
        MemorySession {
            catalog,
            committed: HashMap::new(),
            index: HashMap::new(),
            pending: HashMap::new(),
            stats: SessionStats::default(),
            fail_lookups: false,
            fail_next_commit: false,
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Committed object count
    pub fn object_count(&self) -> usize {
        self.committed.len()
    }

    /// Convenience for tests: committed object by its matching key
    pub fn object_by_external_id(&self, entity_type: &str, external_id: &str) -> Option<&LocalObject> {
        self.index
            .get(&(entity_type.to_string(), external_id.to_string()))
            .and_then(|id| self.committed.get(id))
    }
}

impl ExternalIdIndex for MemorySession {
    fn find(&self, entity_type: &str, external_id: &str) -> Result<Option<LocalId>, LookupError> {
        if self.fail_lookups {
            return Err(LookupError::Unavailable("injected lookup failure".to_string()));
        }

        Ok(self
            .index
            .get(&(entity_type.to_string(), external_id.to_string()))
            .copied())
    }
}

impl PersistenceSession for MemorySession {
    fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    fn create_object(&mut self, entity_type: &str, external_id: &str) -> LocalId {
        let obj = LocalObject::new(entity_type, external_id);
        let id = obj.id;
        self.pending.insert(id, obj);
        id
    }

    fn set_fields(&mut self, id: LocalId, fields: HashMap<String, PersistedValue>) {
        let current = self
            .pending
            .get(&id)
            .or_else(|| self.committed.get(&id))
            .cloned();

        let Some(mut obj) = current else {
            tracing::warn!(%id, "set_fields on unknown object handle, ignoring");
            return;
        };

        // A freshly created object stays pending even with an empty diff
        let mut changed = self.pending.contains_key(&id);

        for (name, value) in fields {
            if obj.fields.get(&name) != Some(&value) {
                obj.fields.insert(name, value);
                changed = true;
            }
        }

        if changed {
            obj.updated_at = Utc::now();
            self.pending.insert(id, obj);
        }
    }

    fn get_object(&self, id: LocalId) -> Option<LocalObject> {
        self.pending
            .get(&id)
            .or_else(|| self.committed.get(&id))
            .cloned()
    }

    fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.fail_next_commit {
            self.fail_next_commit = false;
            self.pending.clear();
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        // Commit with nothing staged is a valid no-op, not a store write
        if self.pending.is_empty() {
            return Ok(());
        }

        // Same backstop as the sqlite UNIQUE(entity_type, external_id)
        // constraint: a staged object whose matching key already belongs
        // to a different identity is a duplicate and the commit fails
        let duplicate = self.pending.iter().find_map(|(id, obj)| {
            let key = (obj.entity_type.clone(), obj.external_id.clone());
            match self.index.get(&key) {
                Some(existing) if existing != id => Some(key),
                _ => None,
            }
        });
        if let Some((entity_type, external_id)) = duplicate {
            self.pending.clear();
            return Err(StoreError::ConstraintViolation(format!(
                "duplicate object for ({}, {})",
                entity_type, external_id
            )));
        }

        self.stats.commits += 1;

        for (id, obj) in self.pending.drain() {
            self.index
                .insert((obj.entity_type.clone(), obj.external_id.clone()), id);
            self.committed.insert(id, obj);
            self.stats.objects_written += 1;
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
