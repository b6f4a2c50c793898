//! Mood classification
//!
//! Maps a photo's label set to a single mood through an ordered keyword table.
//! The first table entry whose keywords intersect the labels wins, so table
//! order decides between moods when several match.

use crate::types::UNDEFINED_MOOD;
use std::collections::BTreeSet;

/// One row of the keyword table: mood name and the labels that select it
pub type MoodRule = (&'static str, &'static [&'static str]);

/// Keyword table used when no custom table is supplied
pub const DEFAULT_MOOD_TABLE: &[MoodRule] = &[
    (
        "happy",
        &["smile", "happy", "joy", "celebration", "party", "fun", "laugh"],
    ),
    (
        "calm",
        &[
            "nature", "water", "sea", "ocean", "sky", "cloud", "mountain", "landscape", "sunset",
        ],
    ),
    (
        "energetic",
        &["sport", "running", "exercise", "adventure", "action", "jump", "dance"],
    ),
    (
        "romantic",
        &["couple", "love", "candle", "flower", "date", "wedding"],
    ),
    (
        "melancholy",
        &["rain", "fog", "mist", "night", "shadow", "dark", "alone"],
    ),
    (
        "neutral",
        &["person", "people", "portrait", "face", "building", "urban", "city"],
    ),
];

/// Classifier over an immutable, ordered keyword table
#[derive(Debug, Clone, Copy)]
pub struct MoodClassifier {
    table: &'static [MoodRule],
}

impl Default for MoodClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MOOD_TABLE)
    }
}

impl MoodClassifier {
    pub fn new(table: &'static [MoodRule]) -> Self {
        Self { table }
    }

    /// Classify a label set. Matching is exact and case-sensitive.
    pub fn classify(&self, labels: &BTreeSet<String>) -> &'static str {
        self.table
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| labels.contains(*k)))
            .map(|(mood, _)| *mood)
            .unwrap_or(UNDEFINED_MOOD)
    }
}
