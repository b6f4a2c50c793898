//! Incremental aggregation
//!
//! This module folds one enriched observation into a user's summary: every
//! histogram, the date span, and the busiest-day timeline. All mutations
//! happen on the caller's in-memory copy; persisting it is the pipeline's job.

use crate::metrics::DerivedMetrics;
use crate::types::{EnrichedObservation, TimelineEntry, UserSummary};

/// Default cap on busiest-day timeline entries
pub const DEFAULT_MAX_TIMELINE: usize = 24;

/// What a single merge changed, for logging and reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Day the observation was counted against
    pub day: String,
    /// The day overtook the previous busiest day on this observation
    pub new_champion: bool,
    /// The photo was appended to the busiest-day timeline
    pub added_to_timeline: bool,
}

/// Aggregator for merging observations into summaries
#[derive(Debug, Clone)]
pub struct Aggregator {
    max_timeline: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TIMELINE)
    }
}

impl Aggregator {
    /// Create an aggregator with the given timeline cap
    pub fn new(max_timeline: usize) -> Self {
        Self { max_timeline }
    }

    /// Merge one observation into `summary` and recompute derived fields.
    ///
    /// Not idempotent: merging the same observation twice counts it twice.
    pub fn merge(&self, summary: &mut UserSummary, enriched: &EnrichedObservation) -> MergeOutcome {
        let observation = &enriched.observation;

        summary.total_photos += 1;

        for label in &observation.labels {
            summary.label_counts.increment(label);
        }

        for swatch in &observation.dominant_colors {
            summary.color_counts.increment(&swatch.color_key());
        }

        summary.mood_counts.increment(&enriched.mood);
        summary.time_bucket_counts.increment(enriched.time_bucket.as_str());

        let day = enriched.day();
        let today_count = summary.per_day_counts.increment(&day);

        // Day strings are YYYY-MM-DD, so lexicographic order is chronological
        if summary.first_date.as_deref().map_or(true, |first| day.as_str() < first) {
            summary.first_date = Some(day.clone());
        }
        if summary.last_date.as_deref().map_or(true, |last| day.as_str() > last) {
            summary.last_date = Some(day.clone());
        }

        let new_champion = self.update_champion(summary, &day, today_count);
        let added_to_timeline = self.update_timeline(summary, &day, enriched);

        DerivedMetrics::compute(summary).apply_to(summary);

        MergeOutcome {
            day,
            new_champion,
            added_to_timeline,
        }
    }

    /// Re-evaluate the busiest day against current counts. Only a strictly
    /// greater count takes over; with no champion yet, any day does.
    fn update_champion(&self, summary: &mut UserSummary, day: &str, today_count: u64) -> bool {
        let champion_count = summary
            .busiest_day
            .as_deref()
            .map(|champion| summary.per_day_counts.get(champion))
            .unwrap_or(0);

        if today_count > champion_count {
            summary.busiest_day = Some(day.to_string());
            summary.busiest_day_photos.clear();
            true
        } else {
            false
        }
    }

    /// Append to the champion's timeline while it has room. Entries are never
    /// removed, so a dethroned day's list is simply replaced on takeover.
    fn update_timeline(
        &self,
        summary: &mut UserSummary,
        day: &str,
        enriched: &EnrichedObservation,
    ) -> bool {
        if summary.busiest_day.as_deref() != Some(day) {
            return false;
        }
        if summary.busiest_day_photos.len() >= self.max_timeline {
            return false;
        }

        summary.busiest_day_photos.push(TimelineEntry {
            time: enriched.clock_time(),
            thumb_key: enriched.thumb_key.clone(),
        });
        summary
            .busiest_day_photos
            .sort_by(|a, b| a.time.cmp(&b.time));
        true
    }
}
