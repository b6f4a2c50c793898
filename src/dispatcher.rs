//! Event validation and dispatch
//!
//! Incoming events are object-store notifications. Only keys under the
//! observation prefix are in scope; everything else is skipped without error.
//! In-scope keys are resolved to observation documents, which are parsed and
//! validated before any summary is touched.

use crate::error::WrappedError;
use crate::store::DocumentStore;
use crate::types::PhotoObservation;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Object-store notification carrying one or more records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "Records")]
    pub records: Vec<StorageRecord>,
}

/// One record of a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    pub s3: ObjectEntity,
    #[serde(rename = "eventTime", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
}

impl StorageNotification {
    pub fn from_json(json: &str) -> Result<Self, WrappedError> {
        let notification: StorageNotification = serde_json::from_str(json)?;
        Ok(notification)
    }

    /// Notification for a single key, as the object store would emit it
    pub fn for_key(bucket: &str, key: &str) -> Self {
        Self {
            records: vec![StorageRecord {
                s3: ObjectEntity {
                    bucket: BucketRef {
                        name: bucket.to_string(),
                    },
                    object: ObjectRef {
                        key: key.to_string(),
                    },
                },
                event_time: None,
            }],
        }
    }
}

/// Routing decision for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The key names an observation document to merge
    Observation { key: String },
    /// The key is outside the observation prefix
    Skip { key: String },
}

/// Dispatcher for storage events
#[derive(Debug, Clone)]
pub struct Dispatcher {
    meta_prefix: String,
}

impl Dispatcher {
    pub fn new(meta_prefix: impl Into<String>) -> Self {
        Self {
            meta_prefix: meta_prefix.into(),
        }
    }

    /// Route the first record of a notification
    pub fn route(&self, notification: &StorageNotification) -> Result<Route, WrappedError> {
        let record = notification
            .records
            .first()
            .ok_or_else(|| WrappedError::InvalidEvent("notification has no records".to_string()))?;
        Ok(self.route_key(&record.s3.object.key))
    }

    pub fn route_key(&self, key: &str) -> Route {
        if key.starts_with(&self.meta_prefix) {
            Route::Observation {
                key: key.to_string(),
            }
        } else {
            info!(key, prefix = %self.meta_prefix, "key not under observation prefix, skipping");
            Route::Skip {
                key: key.to_string(),
            }
        }
    }

    /// Read and validate the observation document stored at `key`
    pub fn load_observation<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        key: &str,
    ) -> Result<PhotoObservation, WrappedError> {
        let document = store
            .get(key)?
            .ok_or_else(|| WrappedError::ObservationNotFound(key.to_string()))?;
        Ok(PhotoObservation::from_json(&document.body)?)
    }
}

/// Layout of a batch of observation documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    /// One document per line
    Ndjson,
    /// A JSON array of documents
    Json,
}

/// Split a batch into raw documents without validating them
pub fn parse_documents(
    input: &str,
    format: BatchFormat,
) -> Result<Vec<serde_json::Value>, WrappedError> {
    match format {
        BatchFormat::Json => {
            let documents: Vec<serde_json::Value> = serde_json::from_str(input)?;
            Ok(documents)
        }
        BatchFormat::Ndjson => {
            let mut documents = Vec::new();
            for (line_num, line) in input.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let document = serde_json::from_str(trimmed).map_err(|e| {
                    WrappedError::InvalidEvent(format!("line {}: {}", line_num + 1, e))
                })?;
                documents.push(document);
            }
            Ok(documents)
        }
    }
}

/// Parse and validate one raw document
pub fn observation_from_value(value: serde_json::Value) -> Result<PhotoObservation, WrappedError> {
    Ok(PhotoObservation::from_value(value)?)
}

/// Failed validation of one document in a batch
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub index: usize,
    pub photo_id: Option<String>,
    pub error: String,
}

/// Validate a batch, returning only the failures
pub fn validate_documents(documents: &[serde_json::Value]) -> Vec<ValidationResult> {
    documents
        .iter()
        .enumerate()
        .filter_map(|(index, document)| {
            observation_from_value(document.clone())
                .err()
                .map(|e| ValidationResult {
                    index,
                    photo_id: document
                        .get("photo_id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    error: e.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryDocumentStore, Precondition};
    use crate::types::ObservationError;

    const OBSERVATION: &str = r#"{"photo_id":"p1","user":"alice","labels":["smile"],
        "dominant_colors":[[1,2,3]],"capture_time":null,"upload_time":"2024-01-01T10:00:00Z"}"#;

    #[test]
    fn test_route_by_prefix() {
        let dispatcher = Dispatcher::new("meta/");
        assert_eq!(
            dispatcher.route_key("meta/p1.json"),
            Route::Observation {
                key: "meta/p1.json".to_string()
            }
        );
        assert_eq!(
            dispatcher.route_key("thumbs/p1.jpg"),
            Route::Skip {
                key: "thumbs/p1.jpg".to_string()
            }
        );
    }

    #[test]
    fn test_parse_notification() {
        let json = r#"{"Records":[{"s3":{"bucket":{"name":"processed"},"object":{"key":"meta/p1.json"}},
            "eventTime":"2024-01-01T10:00:00.000Z"}]}"#;
        let notification = StorageNotification::from_json(json).unwrap();
        let dispatcher = Dispatcher::new("meta/");
        assert!(matches!(
            dispatcher.route(&notification).unwrap(),
            Route::Observation { .. }
        ));
        assert_eq!(notification.records[0].s3.bucket.name, "processed");
    }

    #[test]
    fn test_empty_notification_is_invalid() {
        let notification = StorageNotification::from_json(r#"{"Records":[]}"#).unwrap();
        let dispatcher = Dispatcher::new("meta/");
        assert!(matches!(
            dispatcher.route(&notification),
            Err(WrappedError::InvalidEvent(_))
        ));
        assert!(StorageNotification::from_json("{}").is_err());
    }

    #[test]
    fn test_load_observation() {
        let store = MemoryDocumentStore::new();
        store.put("meta/p1.json", OBSERVATION, &Precondition::Any).unwrap();
        store.put("meta/bad.json", "{\"photo_id\":1}", &Precondition::Any).unwrap();

        let dispatcher = Dispatcher::new("meta/");
        let observation = dispatcher.load_observation(&store, "meta/p1.json").unwrap();
        assert_eq!(observation.user, "alice");

        assert!(matches!(
            dispatcher.load_observation(&store, "meta/missing.json"),
            Err(WrappedError::ObservationNotFound(_))
        ));
        assert!(matches!(
            dispatcher.load_observation(&store, "meta/bad.json"),
            Err(WrappedError::MalformedObservation(_))
        ));
    }

    #[test]
    fn test_parse_and_validate_batch() {
        let input = format!(
            "{}\n\n{}\n",
            OBSERVATION.replace('\n', " "),
            r#"{"photo_id":"p2","labels":[],"dominant_colors":[[1,2]],"upload_time":"x"}"#
        );
        let documents = parse_documents(&input, BatchFormat::Ndjson).unwrap();
        assert_eq!(documents.len(), 2);

        assert!(matches!(
            observation_from_value(documents[1].clone()),
            Err(WrappedError::MalformedObservation(ObservationError::Schema(_)))
        ));

        let failures = validate_documents(&documents);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].photo_id.as_deref(), Some("p2"));

        assert!(parse_documents("{oops", BatchFormat::Ndjson).is_err());
        assert_eq!(
            parse_documents("[]", BatchFormat::Json).unwrap().len(),
            0
        );
    }
}
