//! Pipeline orchestration
//!
//! This module provides the public API for Photo Wrapped. It runs one
//! observation through the full pipeline: dispatch → fetch summary →
//! enrichment → merge → derived metrics → conditional persist.
//!
//! Persisting is a compare-and-swap on the summary's version token. When
//! another worker updated the same user's summary between our fetch and our
//! write, the write is rejected and the whole fetch/merge is redone, so
//! concurrent observations for one user are never lost.

use crate::aggregator::{Aggregator, MergeOutcome};
use crate::config::WrappedConfig;
use crate::dispatcher::{
    observation_from_value, Dispatcher, Route, StorageNotification, ValidationResult,
};
use crate::error::WrappedError;
use crate::mood::MoodClassifier;
use crate::normalizer::{BucketBoundaries, NormalizedTime, TimestampNormalizer};
use crate::store::{DocumentStore, StoreError, SummaryStore};
use crate::types::{EnrichedObservation, PhotoObservation, UserSummary};
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{info, warn};

/// Attaches mood, normalized time, bucket and thumbnail to an observation
#[derive(Debug, Clone)]
pub struct Enricher {
    classifier: MoodClassifier,
    boundaries: BucketBoundaries,
    thumb_prefix: String,
}

impl Enricher {
    pub fn new(
        classifier: MoodClassifier,
        boundaries: BucketBoundaries,
        thumb_prefix: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            boundaries,
            thumb_prefix: thumb_prefix.into(),
        }
    }

    pub fn from_config(config: &WrappedConfig) -> Self {
        Self::new(
            MoodClassifier::default(),
            config.bucket_boundaries,
            config.thumb_prefix.clone(),
        )
    }

    /// Enrich using the current time as the timestamp fallback
    pub fn enrich(&self, observation: PhotoObservation) -> EnrichedObservation {
        let normalized = TimestampNormalizer::normalize(observation.effective_timestamp());
        self.enrich_normalized(observation, normalized)
    }

    /// Enrich using `now` as the timestamp fallback
    pub fn enrich_at(&self, observation: PhotoObservation, now: NaiveDateTime) -> EnrichedObservation {
        let normalized = TimestampNormalizer::normalize_at(observation.effective_timestamp(), now);
        self.enrich_normalized(observation, normalized)
    }

    fn enrich_normalized(
        &self,
        observation: PhotoObservation,
        normalized: NormalizedTime,
    ) -> EnrichedObservation {
        let mood = self.classifier.classify(&observation.labels).to_string();
        let thumb_key = observation.thumbnail_reference(&self.thumb_prefix);

        EnrichedObservation {
            mood,
            taken_at: normalized.at,
            time_bucket: self.boundaries.bucket(normalized.at.hour()),
            thumb_key,
            timestamp_fallback: normalized.fallback,
            observation,
        }
    }
}

/// Result of merging one observation
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub user: String,
    pub photo_id: String,
    pub day: String,
    pub total_photos: u64,
    pub busiest_day: Option<String>,
    pub new_champion: bool,
    pub timestamp_fallback: bool,
    /// Fetch/merge/persist rounds needed, 1 when uncontended
    pub attempts: u32,
    /// Version token of the persisted summary
    pub version: String,
}

/// Result of handling one storage event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The event was outside the observation prefix
    Skipped { key: String },
    /// The user's summary was replaced
    Updated(MergeReport),
}

/// Result of ingesting a batch of observation documents
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Reports of the documents that were merged and persisted
    pub merged: Vec<MergeReport>,
    /// Documents that were rejected or failed to persist
    pub failed: Vec<ValidationResult>,
}

/// Fold one observation into an optional prior summary (stateless, no store).
///
/// # Arguments
/// * `summary_json` - Prior summary document, `None` for a user's first photo
/// * `observation_json` - Observation document
///
/// # Returns
/// The replacement summary document
///
/// # Example
/// ```ignore
/// let summary = wrap_observation(None, observation_json)?;
/// let summary = wrap_observation(Some(&summary), next_observation_json)?;
/// ```
pub fn wrap_observation(
    summary_json: Option<&str>,
    observation_json: &str,
) -> Result<String, WrappedError> {
    let config = WrappedConfig::default();
    let observation = PhotoObservation::from_json(observation_json)?;

    let mut summary = match summary_json {
        Some(json) => UserSummary::from_json(json).map_err(|e| WrappedError::CorruptSummary {
            user: observation.user.clone(),
            reason: e.to_string(),
        })?,
        None => UserSummary::skeleton(),
    };

    let enriched = Enricher::from_config(&config).enrich(observation);
    Aggregator::new(config.max_timeline).merge(&mut summary, &enriched);

    Ok(summary.to_json()?)
}

/// Stateful processor bound to a document store.
///
/// Safe to share across threads; each call is one independent unit of work.
pub struct WrappedProcessor<S> {
    summaries: SummaryStore<S>,
    dispatcher: Dispatcher,
    enricher: Enricher,
    aggregator: Aggregator,
    config: WrappedConfig,
}

impl<S: DocumentStore> WrappedProcessor<S> {
    /// Create a processor with default settings
    pub fn new(documents: S) -> Self {
        Self::with_config(documents, WrappedConfig::default())
    }

    /// Create a processor with a specific configuration
    pub fn with_config(documents: S, config: WrappedConfig) -> Self {
        Self {
            summaries: SummaryStore::new(documents, config.analytics_prefix.clone()),
            dispatcher: Dispatcher::new(config.meta_prefix.clone()),
            enricher: Enricher::from_config(&config),
            aggregator: Aggregator::new(config.max_timeline),
            config,
        }
    }

    pub fn config(&self) -> &WrappedConfig {
        &self.config
    }

    pub fn summaries(&self) -> &SummaryStore<S> {
        &self.summaries
    }

    /// Current summary for a user, if any
    pub fn summary(&self, user: &str) -> Result<Option<UserSummary>, WrappedError> {
        Ok(self.summaries.fetch(user)?.map(|stored| stored.summary))
    }

    /// Handle a raw storage notification document
    pub fn handle_notification(&self, json: &str) -> Result<Outcome, WrappedError> {
        let notification = StorageNotification::from_json(json)?;
        self.handle_event(&notification)
    }

    /// Handle a parsed storage notification
    pub fn handle_event(&self, notification: &StorageNotification) -> Result<Outcome, WrappedError> {
        match self.dispatcher.route(notification)? {
            Route::Skip { key } => Ok(Outcome::Skipped { key }),
            Route::Observation { key } => {
                let observation = self
                    .dispatcher
                    .load_observation(self.summaries.documents(), &key)?;
                Ok(Outcome::Updated(self.ingest(observation)?))
            }
        }
    }

    /// Merge one observation into its owner's summary and persist it
    pub fn ingest(&self, observation: PhotoObservation) -> Result<MergeReport, WrappedError> {
        observation.validate()?;
        let enriched = self.enricher.enrich(observation);
        self.ingest_enriched(&enriched)
    }

    /// Ingest each document of a batch as its own event.
    ///
    /// A failing document does not stop the batch: it is recorded in
    /// `failed` while the others are still merged.
    pub fn ingest_batch(&self, documents: Vec<serde_json::Value>) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, document) in documents.into_iter().enumerate() {
            let photo_id = document
                .get("photo_id")
                .and_then(|v| v.as_str())
                .map(str::to_string);

            match observation_from_value(document).and_then(|obs| self.ingest(obs)) {
                Ok(merged) => report.merged.push(merged),
                Err(e) => {
                    warn!(index, error = %e, "skipping observation in batch");
                    report.failed.push(ValidationResult {
                        index,
                        photo_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Merge an already enriched observation, retrying on concurrent updates
    pub fn ingest_enriched(
        &self,
        enriched: &EnrichedObservation,
    ) -> Result<MergeReport, WrappedError> {
        let user = enriched.observation.user.as_str();

        for attempt in 1..=self.config.max_cas_attempts {
            let (mut summary, expected) = self.summaries.fetch_or_init(user)?;
            let outcome = self.aggregator.merge(&mut summary, enriched);

            match self.summaries.persist(user, &summary, &expected) {
                Ok(version) => {
                    info!(
                        user,
                        photo_id = %enriched.observation.photo_id,
                        total_photos = summary.total_photos,
                        attempt,
                        "updated summary {}",
                        self.summaries.key_for(user)
                    );
                    return Ok(self.report(enriched, &summary, outcome, attempt, version));
                }
                Err(WrappedError::Store(StoreError::VersionMismatch { .. })) => {
                    warn!(user, attempt, "summary changed since fetch, retrying merge");
                }
                Err(e) => return Err(e),
            }
        }

        Err(WrappedError::Conflict {
            user: user.to_string(),
            attempts: self.config.max_cas_attempts,
        })
    }

    fn report(
        &self,
        enriched: &EnrichedObservation,
        summary: &UserSummary,
        outcome: MergeOutcome,
        attempts: u32,
        version: String,
    ) -> MergeReport {
        MergeReport {
            user: enriched.observation.user.clone(),
            photo_id: enriched.observation.photo_id.clone(),
            day: outcome.day,
            total_photos: summary.total_photos,
            busiest_day: summary.busiest_day.clone(),
            new_champion: outcome.new_champion,
            timestamp_fallback: enriched.timestamp_fallback,
            attempts,
            version,
        }
    }
}
