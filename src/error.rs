//! Error types for Photo Wrapped

use thiserror::Error;

use crate::store::StoreError;
use crate::types::ObservationError;

/// Errors that can occur while folding an observation into a summary
#[derive(Debug, Error)]
pub enum WrappedError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Malformed observation: {0}")]
    MalformedObservation(#[from] ObservationError),

    #[error("Invalid storage event: {0}")]
    InvalidEvent(String),

    #[error("Observation document not found: {0}")]
    ObservationNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Concurrent update conflict for user {user} after {attempts} attempts")]
    Conflict { user: String, attempts: u32 },

    #[error("Corrupt summary for user {user}: {reason}")]
    CorruptSummary { user: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
