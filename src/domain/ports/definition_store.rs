//! Repository port for persisted event definitions.

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventKind, StoredDefinition};

/// Tree of named event definitions.
///
/// Bodies are opaque to the store. Calls are synchronous because they are
/// made from the engine's own threads and from the management API.
pub trait DefinitionStore: Send + Sync {
    /// Read one definition. Missing paths yield `DomainError::DefinitionNotFound`.
    fn read(&self, path: &str) -> DomainResult<StoredDefinition>;

    /// Create or replace a definition, returning its new serial number.
    fn write(&self, path: &str, kind: EventKind, body: &str) -> DomainResult<u64>;

    /// Delete a definition. Deleting a missing path is not an error.
    fn delete(&self, path: &str) -> DomainResult<()>;

    /// All paths of `kind` at or beneath `scope`, sorted.
    fn list_paths(&self, scope: &str, kind: EventKind) -> DomainResult<Vec<String>>;
}
