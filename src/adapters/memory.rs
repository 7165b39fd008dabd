//! In-memory DefinitionStore for tests and embedding.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{path, EventKind, StoredDefinition};
use crate::domain::ports::DefinitionStore;

#[derive(Default)]
struct Inner {
    definitions: BTreeMap<String, StoredDefinition>,
    serial: u64,
}

#[derive(Default)]
pub struct MemoryDefinitionStore {
    inner: Mutex<Inner>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DefinitionStore for MemoryDefinitionStore {
    fn read(&self, event_path: &str) -> DomainResult<StoredDefinition> {
        self.inner
            .lock()
            .definitions
            .get(event_path)
            .cloned()
            .ok_or_else(|| DomainError::DefinitionNotFound(event_path.to_string()))
    }

    fn write(&self, event_path: &str, kind: EventKind, body: &str) -> DomainResult<u64> {
        let mut inner = self.inner.lock();
        inner.serial += 1;
        let serial = inner.serial;
        inner.definitions.insert(
            event_path.to_string(),
            StoredDefinition {
                path: event_path.to_string(),
                kind,
                serial,
                last_modified: Utc::now(),
                body: body.to_string(),
            },
        );
        Ok(serial)
    }

    fn delete(&self, event_path: &str) -> DomainResult<()> {
        self.inner.lock().definitions.remove(event_path);
        Ok(())
    }

    fn list_paths(&self, scope: &str, kind: EventKind) -> DomainResult<Vec<String>> {
        let scope = path::normalize(scope)?;
        Ok(self
            .inner
            .lock()
            .definitions
            .values()
            .filter(|d| d.kind == kind && path::is_within(&d.path, &scope))
            .map(|d| d.path.clone())
            .collect())
    }
}
