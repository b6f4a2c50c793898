//! Summary persistence
//!
//! Documents live in an external object store reached only through get/put.
//! Every stored document carries an opaque version token, and writes can be
//! made conditional on it so that concurrent merges for the same user cannot
//! silently overwrite each other.

mod filesystem;
mod memory;

pub use filesystem::FsDocumentStore;
pub use memory::MemoryDocumentStore;

use crate::error::WrappedError;
use crate::types::UserSummary;
use thiserror::Error;
use tracing::debug;

/// Version reported for documents written without a version token
pub const UNVERSIONED: &str = "unversioned";

/// A stored document body with its version token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedDocument {
    pub body: String,
    pub version: String,
}

/// Condition a write must satisfy to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite
    Any,
    /// The key must not exist yet
    Absent,
    /// The stored version must still be this token
    Version(String),
}

impl Precondition {
    /// Check the precondition against the currently stored version
    pub fn holds(&self, current: Option<&str>) -> bool {
        match (self, current) {
            (Precondition::Any, _) => true,
            (Precondition::Absent, None) => true,
            (Precondition::Absent, Some(_)) => false,
            (Precondition::Version(_), None) => false,
            (Precondition::Version(expected), Some(found)) => expected == found,
        }
    }
}

/// Errors from the document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version mismatch writing {key}")]
    VersionMismatch { key: String },

    #[error("invalid document key: {0}")]
    InvalidKey(String),

    #[error("store lock failed: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for object-store backends
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if the key does not exist
    fn get(&self, key: &str) -> Result<Option<VersionedDocument>, StoreError>;

    /// Replace the whole document at `key` if `expected` holds.
    /// Returns the new version token.
    fn put(&self, key: &str, body: &str, expected: &Precondition) -> Result<String, StoreError>;

    /// Keys under `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// New opaque version token
pub(crate) fn next_version() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A summary as read from the store, with the version it was read at
#[derive(Debug, Clone)]
pub struct StoredSummary {
    pub summary: UserSummary,
    pub version: String,
}

/// Fetch-or-initialize and persist of one summary document per user
pub struct SummaryStore<S> {
    documents: S,
    analytics_prefix: String,
}

impl<S: DocumentStore> SummaryStore<S> {
    pub fn new(documents: S, analytics_prefix: impl Into<String>) -> Self {
        Self {
            documents,
            analytics_prefix: analytics_prefix.into(),
        }
    }

    /// Underlying document store
    pub fn documents(&self) -> &S {
        &self.documents
    }

    /// Document key of a user's summary
    pub fn key_for(&self, user: &str) -> String {
        format!("{}{}/wrapped.json", self.analytics_prefix, user)
    }

    /// Fetch a user's summary, `None` if the user has none yet
    pub fn fetch(&self, user: &str) -> Result<Option<StoredSummary>, WrappedError> {
        let key = self.key_for(user);
        let Some(document) = self.documents.get(&key)? else {
            return Ok(None);
        };

        let summary =
            UserSummary::from_json(&document.body).map_err(|e| WrappedError::CorruptSummary {
                user: user.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(StoredSummary {
            summary,
            version: document.version,
        }))
    }

    /// Fetch a user's summary or build the zero-valued skeleton. The returned
    /// precondition guards the matching [`SummaryStore::persist`].
    pub fn fetch_or_init(&self, user: &str) -> Result<(UserSummary, Precondition), WrappedError> {
        match self.fetch(user)? {
            Some(stored) => Ok((stored.summary, Precondition::Version(stored.version))),
            None => {
                debug!(user, "no summary yet, starting from skeleton");
                Ok((UserSummary::skeleton(), Precondition::Absent))
            }
        }
    }

    /// Overwrite the user's whole summary document if `expected` still holds
    pub fn persist(
        &self,
        user: &str,
        summary: &UserSummary,
        expected: &Precondition,
    ) -> Result<String, WrappedError> {
        let body = summary.to_json()?;
        let version = self.documents.put(&self.key_for(user), &body, expected)?;
        Ok(version)
    }

    /// Users that have a summary document
    pub fn users(&self) -> Result<Vec<String>, WrappedError> {
        let keys = self.documents.list(&self.analytics_prefix)?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                key.strip_prefix(self.analytics_prefix.as_str())?
                    .strip_suffix("/wrapped.json")
                    .filter(|user| !user.is_empty() && !user.contains('/'))
                    .map(str::to_string)
            })
            .collect())
    }
}
