// ⚖️ Record Reconciler - Merge remote records into the local object graph
//
// One idempotent pass per record:
//   classify fields → resolve references → lookup-or-create → apply → commit
//
// Re-invoking with the same record reaches the same end state (idempotent
// upsert). References to records that do not exist locally yet are left
// unset and self-heal when the referencing record is reconciled again
// after the target arrives. Re-delivery is the transport's job, not ours.

use crate::catalog::FieldKind;
use crate::error::ReconcileError;
use crate::object::{LocalId, PersistedValue};
use crate::record::RemoteRecord;
use crate::session::PersistenceSession;
use crate::value::FieldValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

// ============================================================================
// RECONCILE OUTCOME
// ============================================================================

/// Result of one successful `reconcile` call
#[derive(Debug, Clone, Serialize)]
pub enum ReconcileOutcome {
    /// Record type absent from the schema catalog: outside the locally
    /// mirrored schema, silently ignored, no store mutation
    Skipped { record_type: String },

    /// Record merged into the local graph
    Applied(ReconcileReport),
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied(_))
    }

    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            ReconcileOutcome::Applied(report) => Some(report),
            ReconcileOutcome::Skipped { .. } => None,
        }
    }
}

/// Per-call report of what the merge did and what it had to survive
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Handle of the target local object
    pub handle: LocalId,

    /// True if this call created the object, false if it updated one
    pub created: bool,

    /// Attribute fields applied
    pub attributes_applied: Vec<String>,

    /// Relationship fields resolved to a local object
    pub references_resolved: Vec<String>,

    /// Relationship fields whose target is not locally present yet;
    /// left unset on this pass
    pub references_unresolved: Vec<String>,

    /// Fields dropped because they match neither the attribute set nor
    /// the relationship set of the entity shape
    pub fields_dropped: Vec<String>,

    /// Index failures survived in best-effort mode
    pub lookup_failures: Vec<String>,

    /// False when the computed state already matched and the store-level
    /// write was skipped
    pub committed: bool,

    pub reconciled_at: DateTime<Utc>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        format!(
            "{} {}: {} attributes, {} references resolved, {} unresolved, {} dropped{}",
            if self.created { "created" } else { "updated" },
            self.handle,
            self.attributes_applied.len(),
            self.references_resolved.len(),
            self.references_unresolved.len(),
            self.fields_dropped.len(),
            if self.committed { "" } else { " (no-op, commit skipped)" },
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// The reconciliation engine.
///
/// `best_effort` makes the original's swallow-and-continue policy explicit:
/// when on (the default), index failures during resolution and
/// lookup-or-create are logged, recorded in the report, and the merge
/// proceeds with whatever it has: a transient lookup failure must not
/// drop an otherwise-valid attribute update. When off, the first lookup
/// failure aborts the call. Commit failures abort in either mode.
pub struct Reconciler {
    pub best_effort: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Reconciler { best_effort: true }
    }

    /// Escalate lookup failures instead of continuing without them
    pub fn strict() -> Self {
        Reconciler { best_effort: false }
    }

    /// Merge one remote record into the local object graph.
    ///
    /// Steps:
    /// 1. Catalog lookup; unknown record type returns `Skipped`
    /// 2. Classify fields into attributes vs. relationships (others drop)
    /// 3. Resolve each reference against the target type's index
    /// 4. Look up the target object by `(type, external_id)`, or create it
    /// 5. Bulk-apply attributes and resolved links (full overwrite of each
    ///    present field; absent fields stay untouched)
    /// 6. Commit iff the session has pending changes
    pub fn reconcile<S: PersistenceSession>(
        &self,
        record: &RemoteRecord,
        session: &mut S,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        // Step 1: schema lookup
        let Some(shape) = session.catalog().entity(&record.record_type).cloned() else {
            tracing::debug!(
                record_type = %record.record_type,
                external_id = %record.external_id,
                "record type not in catalog, skipping"
            );
            return Ok(ReconcileOutcome::Skipped {
                record_type: record.record_type.clone(),
            });
        };

        let mut staged: HashMap<String, PersistedValue> = HashMap::new();
        let mut attributes_applied = Vec::new();
        let mut references_resolved = Vec::new();
        let mut references_unresolved = Vec::new();
        let mut fields_dropped = Vec::new();
        let mut lookup_failures = Vec::new();

        // Steps 2 + 3: classify and resolve
        for (name, value) in &record.fields {
            match (shape.classify(name), value) {
                (FieldKind::Attribute, FieldValue::Value(v)) => {
                    staged.insert(name.clone(), PersistedValue::Attribute(v.clone()));
                    attributes_applied.push(name.clone());
                }

                (FieldKind::Relationship { target_type }, FieldValue::Reference(ext_id)) => {
                    match session.find(target_type, ext_id) {
                        Ok(Some(target)) => {
                            staged.insert(name.clone(), PersistedValue::Link(target));
                            references_resolved.push(name.clone());
                        }
                        Ok(None) => {
                            // Target not locally present yet; the field
                            // stays unset and heals on a later pass
                            references_unresolved.push(name.clone());
                        }
                        Err(e) => {
                            if !self.best_effort {
                                return Err(e.into());
                            }
                            tracing::warn!(
                                field = %name,
                                target_type = %target_type,
                                target_external_id = %ext_id,
                                error = %e,
                                "reference lookup failed, continuing without it"
                            );
                            lookup_failures.push(format!("{}: {}", name, e));
                            references_unresolved.push(name.clone());
                        }
                    }
                }

                // Shape and wire disagree about the field kind
                (FieldKind::Attribute, FieldValue::Reference(_))
                | (FieldKind::Relationship { .. }, FieldValue::Value(_)) => {
                    tracing::warn!(
                        field = %name,
                        record_type = %record.record_type,
                        "field kind mismatch between record and catalog, dropping"
                    );
                    fields_dropped.push(name.clone());
                }

                (FieldKind::Unknown, _) => {
                    fields_dropped.push(name.clone());
                }
            }
        }

        // Step 4: lookup-or-create by the matching key
        let (handle, created) = match session.find(&record.record_type, &record.external_id) {
            Ok(Some(existing)) => (existing, false),
            Ok(None) => (
                session.create_object(&record.record_type, &record.external_id),
                true,
            ),
            Err(e) => {
                if !self.best_effort {
                    return Err(e.into());
                }
                // Create-new fallback. If the object does exist and the
                // lookup merely failed transiently, the unique index
                // rejects the duplicate at commit and the error surfaces
                // there instead of silently dropping the update.
                tracing::warn!(
                    record_type = %record.record_type,
                    external_id = %record.external_id,
                    error = %e,
                    "lookup-or-create fetch failed, falling back to create"
                );
                lookup_failures.push(format!("lookup-or-create: {}", e));
                (
                    session.create_object(&record.record_type, &record.external_id),
                    true,
                )
            }
        };

        // Step 5: bulk-apply
        session.set_fields(handle, staged);

        // Step 6: commit if dirty
        let committed = if session.has_pending_changes() {
            session.commit()?;
            true
        } else {
            false
        };

        Ok(ReconcileOutcome::Applied(ReconcileReport {
            handle,
            created,
            attributes_applied,
            references_resolved,
            references_unresolved,
            fields_dropped,
            lookup_failures,
            committed,
            reconciled_at: Utc::now(),
        }))
    }

    /// Reconcile a batch of records sequentially against one session.
    ///
    /// Sequential order gives read-your-writes between records: a record
    /// referencing an object created earlier in the batch resolves because
    /// the earlier call committed first. One record's failure never blocks
    /// the rest.
    pub fn reconcile_batch<S: PersistenceSession>(
        &self,
        records: &[RemoteRecord],
        session: &mut S,
    ) -> BatchReport {
        let mut outcomes = Vec::with_capacity(records.len());
        let mut applied = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for record in records {
            let outcome = self.reconcile(record, session);
            match &outcome {
                Ok(ReconcileOutcome::Applied(_)) => applied += 1,
                Ok(ReconcileOutcome::Skipped { .. }) => skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        record_type = %record.record_type,
                        external_id = %record.external_id,
                        error = %e,
                        "record failed, batch continues"
                    );
                    failed += 1;
                }
            }
            outcomes.push(outcome);
        }

        BatchReport {
            outcomes,
            applied,
            skipped,
            failed,
            completed_at: Utc::now(),
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BATCH REPORT
// ============================================================================

/// Per-batch outcome summary; one entry per input record, in input order
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<Result<ReconcileOutcome, ReconcileError>>,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub completed_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Batch of {}: {} applied, {} skipped, {} failed",
            self.outcomes.len(),
            self.applied,
            self.skipped,
            self.failed
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
