// Record Mirror - Core Library
// One-way reconciliation of remote records into a local object graph

pub mod value;      // Typed attribute values + remote field values
pub mod record;     // Remote Record - incoming unit of data
pub mod catalog;    // Schema Catalog - locally mirrored entity shapes
pub mod object;     // Local Object - the persisted representation
pub mod session;    // Persistence Session traits + in-memory session
pub mod db;         // SQLite-backed session with audit trail
pub mod reconciler; // The reconciliation engine
pub mod error;      // Error taxonomy

// Re-export commonly used types
pub use value::{AttributeValue, FieldValue};
pub use record::RemoteRecord;
pub use catalog::{EntityShape, FieldKind, SchemaCatalog};
pub use object::{LocalId, LocalObject, PersistedValue};
pub use session::{ExternalIdIndex, MemorySession, PersistenceSession, SessionStats};
pub use db::{AuditEvent, SqliteSession};
pub use reconciler::{BatchReport, ReconcileOutcome, ReconcileReport, Reconciler};
pub use error::{LookupError, ReconcileError, StoreError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
