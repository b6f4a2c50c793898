//! Core types for the Photo Wrapped engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: the incoming photo observation, the enriched observation, and the
//! persisted per-user summary document.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// User recorded when an observation does not name its owner
pub const UNKNOWN_USER: &str = "unknown";

/// Mood recorded when no keyword table entry matches
pub const UNDEFINED_MOOD: &str = "Undefined";

/// One dominant colour swatch as an RGB triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb([r, g, b])
    }

    /// Canonical histogram key, e.g. `"10,20,30"`
    pub fn color_key(&self) -> String {
        let [r, g, b] = self.0;
        format!("{r},{g},{b}")
    }

    /// Decode a key produced by [`Rgb::color_key`]
    pub fn from_color_key(key: &str) -> Option<Self> {
        let mut channels = key.split(',').map(|c| c.trim().parse::<u8>());
        let r = channels.next()?.ok()?;
        let g = channels.next()?.ok()?;
        let b = channels.next()?.ok()?;
        if channels.next().is_some() {
            return None;
        }
        Some(Rgb([r, g, b]))
    }
}

impl TryFrom<Vec<i64>> for Rgb {
    type Error = ObservationError;

    fn try_from(value: Vec<i64>) -> Result<Self, Self::Error> {
        if value.len() != 3 {
            return Err(ObservationError::ColorArity(value.len()));
        }
        let mut channels = [0u8; 3];
        for (slot, raw) in channels.iter_mut().zip(value.iter()) {
            *slot = u8::try_from(*raw).map_err(|_| ObservationError::ColorChannel(*raw))?;
        }
        Ok(Rgb(channels))
    }
}

impl From<Rgb> for Vec<i64> {
    fn from(rgb: Rgb) -> Self {
        rgb.0.iter().map(|c| i64::from(*c)).collect()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.color_key())
    }
}

/// Validation errors for observation documents
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    #[error("photo_id must not be empty")]
    EmptyPhotoId,

    #[error("upload_time must not be empty")]
    EmptyUploadTime,

    #[error("user {0:?} cannot be used as a summary key")]
    InvalidUser(String),

    #[error("colour swatch must have 3 channels, got {0}")]
    ColorArity(usize),

    #[error("colour channel {0} is outside 0-255")]
    ColorChannel(i64),

    #[error("{0}")]
    Schema(String),
}

/// One photo's content-analysis output
///
/// Upstream producers attach more fields (source key, face count, image
/// dimensions); they are accepted and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoObservation {
    pub photo_id: String,
    #[serde(default = "unknown_user", deserialize_with = "deserialize_user")]
    pub user: String,
    /// Content labels; duplicates collapse
    pub labels: BTreeSet<String>,
    pub dominant_colors: Vec<Rgb>,
    #[serde(default)]
    pub capture_time: Option<String>,
    pub upload_time: String,
}

fn unknown_user() -> String {
    UNKNOWN_USER.to_string()
}

fn deserialize_user<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let user = Option::<String>::deserialize(deserializer)?;
    Ok(user
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(unknown_user))
}

impl PhotoObservation {
    /// Parse and validate an observation document
    pub fn from_json(json: &str) -> Result<Self, ObservationError> {
        let observation: PhotoObservation =
            serde_json::from_str(json).map_err(|e| ObservationError::Schema(e.to_string()))?;
        observation.validate()?;
        Ok(observation)
    }

    /// Same as [`PhotoObservation::from_json`] for an already parsed document
    pub fn from_value(value: serde_json::Value) -> Result<Self, ObservationError> {
        let observation: PhotoObservation =
            serde_json::from_value(value).map_err(|e| ObservationError::Schema(e.to_string()))?;
        observation.validate()?;
        Ok(observation)
    }

    pub fn validate(&self) -> Result<(), ObservationError> {
        if self.photo_id.trim().is_empty() {
            return Err(ObservationError::EmptyPhotoId);
        }
        if self.upload_time.trim().is_empty() {
            return Err(ObservationError::EmptyUploadTime);
        }
        if self.user.contains('/')
            || self.user.contains('\\')
            || self.user == "."
            || self.user == ".."
        {
            return Err(ObservationError::InvalidUser(self.user.clone()));
        }
        Ok(())
    }

    /// The timestamp to analyse: capture time when present, upload time otherwise
    pub fn effective_timestamp(&self) -> &str {
        match self.capture_time.as_deref() {
            Some(capture) if !capture.trim().is_empty() => capture,
            _ => &self.upload_time,
        }
    }

    /// Thumbnail object key for this photo
    pub fn thumbnail_reference(&self, thumb_prefix: &str) -> String {
        format!("{}{}.jpg", thumb_prefix, self.photo_id)
    }
}

/// Coarse time-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBucket {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::Night => "Night",
            TimeBucket::Morning => "Morning",
            TimeBucket::Afternoon => "Afternoon",
            TimeBucket::Evening => "Evening",
        }
    }
}

/// An observation with its mood, normalized time and thumbnail attached
#[derive(Debug, Clone)]
pub struct EnrichedObservation {
    /// Source observation
    pub observation: PhotoObservation,
    /// Mood category from the keyword table
    pub mood: String,
    /// Normalized capture (or upload) time
    pub taken_at: NaiveDateTime,
    /// Time-of-day bucket of `taken_at`
    pub time_bucket: TimeBucket,
    /// Thumbnail reference for the timeline
    pub thumb_key: String,
    /// True when the timestamp could not be parsed and processing time was used
    pub timestamp_fallback: bool,
}

impl EnrichedObservation {
    /// Calendar day, `YYYY-MM-DD`
    pub fn day(&self) -> String {
        self.taken_at.format("%Y-%m-%d").to_string()
    }

    /// Zero-padded 24-hour clock time, `HH:MM`
    pub fn clock_time(&self) -> String {
        self.taken_at.format("%H:%M").to_string()
    }
}

/// Counting map with an explicit increment-or-insert operation.
///
/// Keys are kept in lexicographic order, so iteration, serialization and
/// tie-breaking in [`Histogram::max_entry`] are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Histogram(BTreeMap<String, u64>);

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `key`, inserting it at 1 if absent. Returns the new count.
    pub fn increment(&mut self, key: &str) -> u64 {
        let count = self.0.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Count for `key`, zero when absent
    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Entry with the highest count. Ties resolve to the lexicographically
    /// smallest key.
    pub fn max_entry(&self) -> Option<(&str, u64)> {
        let mut best: Option<(&str, u64)> = None;
        for (key, count) in &self.0 {
            match best {
                Some((_, top)) if *count <= top => {}
                _ => best = Some((key.as_str(), *count)),
            }
        }
        best
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Histogram {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Histogram(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One photo on the busiest-day timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// `HH:MM`
    pub time: String,
    pub thumb_key: String,
}

/// Per-user rolling analytics document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSummary {
    pub total_photos: u64,
    pub label_counts: Histogram,
    pub mood_counts: Histogram,
    pub color_counts: Histogram,
    pub time_bucket_counts: Histogram,
    pub per_day_counts: Histogram,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub busiest_day: Option<String>,
    pub busiest_day_photos: Vec<TimelineEntry>,

    // Derived fields, recomputed on every update
    pub most_common_label: Option<String>,
    pub favourite_color: Option<Rgb>,
    pub avg_photos_per_day: Option<f64>,
}

impl UserSummary {
    /// Zero-valued skeleton used for a user's first observation
    pub fn skeleton() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Check the structural invariants every persisted summary must hold.
    /// Returns a description of each violation found.
    pub fn invariant_violations(&self, max_timeline: usize) -> Vec<String> {
        let mut violations = Vec::new();

        for (name, histogram) in [
            ("mood_counts", &self.mood_counts),
            ("time_bucket_counts", &self.time_bucket_counts),
            ("per_day_counts", &self.per_day_counts),
        ] {
            let sum = histogram.total();
            if sum != self.total_photos {
                violations.push(format!(
                    "{} sums to {} but total_photos is {}",
                    name, sum, self.total_photos
                ));
            }
        }

        if self.busiest_day_photos.len() > max_timeline {
            violations.push(format!(
                "busiest_day_photos has {} entries, cap is {}",
                self.busiest_day_photos.len(),
                max_timeline
            ));
        }

        if self
            .busiest_day_photos
            .windows(2)
            .any(|pair| pair[0].time > pair[1].time)
        {
            violations.push("busiest_day_photos is not sorted by time".to_string());
        }

        if let (Some(first), Some(last)) = (&self.first_date, &self.last_date) {
            if first > last {
                violations.push(format!("first_date {first} is after last_date {last}"));
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_color_key_round_trip() {
        let rgb = Rgb::new(10, 200, 3);
        assert_eq!(rgb.color_key(), "10,200,3");
        assert_eq!(Rgb::from_color_key("10,200,3"), Some(rgb));
        assert_eq!(Rgb::from_color_key("10,200"), None);
        assert_eq!(Rgb::from_color_key("10,200,3,4"), None);
        assert_eq!(Rgb::from_color_key("10,x,3"), None);
    }

    #[test]
    fn test_observation_parsing_defaults() {
        let json = r#"{
            "photo_id": "p1",
            "labels": ["smile", "party", "smile"],
            "dominant_colors": [[1,2,3],[4,5,6]],
            "upload_time": "2024-01-01T10:00:00Z",
            "face_count": 2,
            "width": 1024
        }"#;
        let obs = PhotoObservation::from_json(json).unwrap();
        assert_eq!(obs.user, UNKNOWN_USER);
        assert_eq!(obs.labels.len(), 2);
        assert_eq!(obs.dominant_colors[1], Rgb::new(4, 5, 6));
        assert_eq!(obs.capture_time, None);
        assert_eq!(obs.effective_timestamp(), "2024-01-01T10:00:00Z");
    }

    #[test]
    fn test_null_user_is_unknown() {
        let json = r#"{"photo_id":"p1","user":null,"labels":[],"dominant_colors":[],"upload_time":"x"}"#;
        let obs = PhotoObservation::from_json(json).unwrap();
        assert_eq!(obs.user, UNKNOWN_USER);
    }

    #[test]
    fn test_capture_time_preferred() {
        let json = r#"{"photo_id":"p1","user":"alice","labels":[],"dominant_colors":[],
            "capture_time":"2023:05:06 07:08:09","upload_time":"2024-01-01T10:00:00Z"}"#;
        let obs = PhotoObservation::from_json(json).unwrap();
        assert_eq!(obs.effective_timestamp(), "2023:05:06 07:08:09");
        assert_eq!(obs.thumbnail_reference("thumbs/"), "thumbs/p1.jpg");
    }

    #[test]
    fn test_bad_color_triple_rejected() {
        let json = r#"{"photo_id":"p1","labels":[],"dominant_colors":[[1,2]],"upload_time":"x"}"#;
        assert!(PhotoObservation::from_json(json).is_err());

        let json = r#"{"photo_id":"p1","labels":[],"dominant_colors":[[1,2,300]],"upload_time":"x"}"#;
        assert!(PhotoObservation::from_json(json).is_err());
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        assert!(PhotoObservation::from_json(r#"{"photo_id":"p1"}"#).is_err());
        let json = r#"{"photo_id":"","labels":[],"dominant_colors":[],"upload_time":"x"}"#;
        assert!(PhotoObservation::from_json(json).is_err());
        let json = r#"{"photo_id":"p","user":"../etc","labels":[],"dominant_colors":[],"upload_time":"x"}"#;
        assert!(PhotoObservation::from_json(json).is_err());
    }

    #[test]
    fn test_dot_users_rejected() {
        for user in [".", "..", "a/b", "a\\b"] {
            let obs = PhotoObservation {
                photo_id: "p1".to_string(),
                user: user.to_string(),
                labels: BTreeSet::new(),
                dominant_colors: Vec::new(),
                capture_time: None,
                upload_time: "x".to_string(),
            };
            assert_eq!(
                obs.validate(),
                Err(ObservationError::InvalidUser(user.to_string())),
                "{user:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_schema_errors_are_observation_errors() {
        let json = r#"{"photo_id":"p1","labels":[],"dominant_colors":[[1,2]],"upload_time":"x"}"#;
        assert!(matches!(
            PhotoObservation::from_json(json),
            Err(ObservationError::Schema(msg)) if msg.contains("3 channels")
        ));
        assert!(matches!(
            PhotoObservation::from_json("not json"),
            Err(ObservationError::Schema(_))
        ));
    }

    #[test]
    fn test_histogram_increment_and_max() {
        let mut h = Histogram::new();
        assert_eq!(h.get("a"), 0);
        assert_eq!(h.increment("b"), 1);
        assert_eq!(h.increment("a"), 1);
        assert_eq!(h.increment("b"), 2);
        assert_eq!(h.total(), 3);
        assert_eq!(h.max_entry(), Some(("b", 2)));

        h.increment("a");
        // tie between "a" and "b" resolves to the smaller key
        assert_eq!(h.max_entry(), Some(("a", 2)));
        assert_eq!(Histogram::new().max_entry(), None);
    }

    #[test]
    fn test_summary_parses_partial_document() {
        let json = r#"{"total_photos": 2, "per_day_counts": {"2024-01-01": 2}, "busiest_day": null}"#;
        let summary = UserSummary::from_json(json).unwrap();
        assert_eq!(summary.total_photos, 2);
        assert_eq!(summary.per_day_counts.get("2024-01-01"), 2);
        assert!(summary.busiest_day_photos.is_empty());
        assert_eq!(summary.most_common_label, None);
    }

    #[test]
    fn test_invariant_violations_reported() {
        let mut summary = UserSummary::skeleton();
        assert!(summary.invariant_violations(24).is_empty());

        summary.total_photos = 1;
        let violations = summary.invariant_violations(24);
        assert_eq!(violations.len(), 3);
    }
}
