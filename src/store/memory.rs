//! In-process document store
//!
//! Backs tests and single-process deployments. Conditional writes are checked
//! and applied under one lock, so the compare-and-swap is atomic.

use super::{next_version, DocumentStore, Precondition, StoreError, VersionedDocument};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Document store held in memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, VersionedDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, VersionedDocument>>, StoreError> {
        self.documents
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, key: &str) -> Result<Option<VersionedDocument>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, body: &str, expected: &Precondition) -> Result<String, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }

        let mut documents = self.lock()?;
        let current = documents.get(key).map(|d| d.version.as_str());
        if !expected.holds(current) {
            return Err(StoreError::VersionMismatch {
                key: key.to_string(),
            });
        }

        let version = next_version();
        documents.insert(
            key.to_string(),
            VersionedDocument {
                body: body.to_string(),
                version: version.clone(),
            },
        );
        Ok(version)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
