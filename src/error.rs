// Error taxonomy for reconciliation
//
// Three distinct failure classes, deliberately kept apart:
// - UnknownType is NOT an error (it's filtering) and never appears here;
//   the reconciler reports it as a skipped outcome instead.
// - LookupError covers index/query failures; recoverable under best-effort.
// - StoreError covers commit failures; always escalates to the caller.

use thiserror::Error;

// ============================================================================
// LOOKUP ERRORS
// ============================================================================

/// Failure while querying the external-id index or resolving a reference.
///
/// Under best-effort reconciliation these are logged and recorded in the
/// per-call report; in strict mode the first one aborts the call.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The backing store could not be reached or refused the query
    #[error("index unavailable: {0}")]
    Unavailable(String),

    /// The query ran but produced an invalid or unreadable row
    #[error("index query failed: {0}")]
    Query(String),
}

impl From<rusqlite::Error> for LookupError {
    fn from(e: rusqlite::Error) -> Self {
        LookupError::Query(e.to_string())
    }
}

// ============================================================================
// STORE ERRORS
// ============================================================================

/// Failure while committing staged changes to the local store.
///
/// Rollback of partial state is the session's transactional responsibility,
/// not the reconciler's.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or foreign-key constraint rejected the write
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Any other backend failure during commit
    #[error("commit failed: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(e.to_string())
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Backend(format!("field serialization failed: {}", e))
    }
}

// ============================================================================
// RECONCILE ERRORS
// ============================================================================

/// Failure result of a single `reconcile` call.
///
/// Only two paths escalate: a lookup failure in strict mode, and a commit
/// failure in any mode. Everything else is recovered locally.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("store commit failed: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// TESTS
// ============================================================================
