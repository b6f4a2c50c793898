//! Timestamp normalization
//!
//! This module turns the textual capture/upload timestamps found in
//! observation documents into a single internal time value.
//! - EXIF style `YYYY:MM:DD HH:MM:SS`
//! - ISO-8601 `YYYY-MM-DDTHH:MM:SS[.fff][Z]`
//! - Anything else falls back to the processing time
//!
//! It also owns the time-of-day bucket tables.

use crate::types::TimeBucket;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const ISO_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Result of normalizing one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedTime {
    pub at: NaiveDateTime,
    /// True when the input was unparseable and processing time was used
    pub fallback: bool,
}

/// Normalizer for capture/upload timestamps
pub struct TimestampNormalizer;

impl TimestampNormalizer {
    /// Normalize `raw`, falling back to the current UTC time on failure
    pub fn normalize(raw: &str) -> NormalizedTime {
        Self::normalize_at(raw, Utc::now().naive_utc())
    }

    /// Normalize `raw`, falling back to `now` on failure
    pub fn normalize_at(raw: &str, now: NaiveDateTime) -> NormalizedTime {
        match parse_timestamp(raw) {
            Some(at) => NormalizedTime {
                at,
                fallback: false,
            },
            None => {
                debug!(raw, "unparseable timestamp, using processing time");
                NormalizedTime {
                    at: now,
                    fallback: true,
                }
            }
        }
    }
}

/// Parse either accepted format, `None` if neither matches
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if is_exif_style(raw) {
        return NaiveDateTime::parse_from_str(raw, EXIF_FORMAT).ok();
    }

    parse_iso(raw)
}

/// EXIF timestamps delimit the date with colons at byte offsets 4 and 7
fn is_exif_style(raw: &str) -> bool {
    raw.get(4..5) == Some(":") && raw.get(7..8) == Some(":")
}

fn parse_iso(raw: &str) -> Option<NaiveDateTime> {
    let stripped = raw.strip_suffix('Z').unwrap_or(raw);

    for format in ISO_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(stripped, format) {
            return Some(parsed);
        }
    }

    // Explicit offsets keep their local wall-clock time
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }

    NaiveDate::parse_from_str(stripped, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Time-of-day boundary table.
///
/// Two tables exist in deployed variants of this engine; a deployment picks
/// one and applies it to every observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketBoundaries {
    /// Night >= 21 or < 5, Morning < 12, Afternoon < 17, else Evening
    #[default]
    Standard,
    /// Night < 6, Morning < 12, Afternoon < 18, else Evening
    Alternate,
}

impl BucketBoundaries {
    /// Bucket for an hour in 0..=23
    pub fn bucket(&self, hour: u32) -> TimeBucket {
        match self {
            BucketBoundaries::Standard => {
                if hour >= 21 || hour < 5 {
                    TimeBucket::Night
                } else if hour < 12 {
                    TimeBucket::Morning
                } else if hour < 17 {
                    TimeBucket::Afternoon
                } else {
                    TimeBucket::Evening
                }
            }
            BucketBoundaries::Alternate => {
                if hour < 6 {
                    TimeBucket::Night
                } else if hour < 12 {
                    TimeBucket::Morning
                } else if hour < 18 {
                    TimeBucket::Afternoon
                } else {
                    TimeBucket::Evening
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketBoundaries::Standard => "standard",
            BucketBoundaries::Alternate => "alternate",
        }
    }
}

impl FromStr for BucketBoundaries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(BucketBoundaries::Standard),
            "alternate" => Ok(BucketBoundaries::Alternate),
            other => Err(format!("unknown time bucket table: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_exif() {
        assert_eq!(
            parse_timestamp("2023:07:04 18:30:05"),
            Some(dt("2023-07-04 18:30:05"))
        );
    }

    #[test]
    fn test_parse_iso_variants() {
        let expected = Some(dt("2024-01-01 10:00:00"));
        assert_eq!(parse_timestamp("2024-01-01T10:00:00Z"), expected);
        assert_eq!(parse_timestamp("2024-01-01T10:00:00"), expected);
        assert_eq!(parse_timestamp("2024-01-01 10:00:00"), expected);

        let fractional = parse_timestamp("2024-01-01T10:00:00.123Z").unwrap();
        assert_eq!(fractional.hour(), 10);
        assert_eq!(fractional.format("%Y-%m-%d").to_string(), "2024-01-01");

        let offset = parse_timestamp("2024-01-01T23:15:00+02:00").unwrap();
        assert_eq!(offset.hour(), 23);

        assert_eq!(
            parse_timestamp("2024-01-01"),
            Some(dt("2024-01-01 00:00:00"))
        );
    }

    #[test]
    fn test_unparseable_falls_back() {
        let now = dt("2030-06-15 20:45:00");
        for raw in ["not-a-date", "", "2024:13:45 99:00:00", "12:34"] {
            let normalized = TimestampNormalizer::normalize_at(raw, now);
            assert!(normalized.fallback, "{raw:?} should fall back");
            assert_eq!(normalized.at, now);
        }
    }

    #[test]
    fn test_normalize_without_clock_does_not_fail() {
        let normalized = TimestampNormalizer::normalize("garbage");
        assert!(normalized.fallback);
    }

    #[test]
    fn test_standard_buckets() {
        let table = BucketBoundaries::Standard;
        assert_eq!(table.bucket(0), TimeBucket::Night);
        assert_eq!(table.bucket(4), TimeBucket::Night);
        assert_eq!(table.bucket(5), TimeBucket::Morning);
        assert_eq!(table.bucket(11), TimeBucket::Morning);
        assert_eq!(table.bucket(12), TimeBucket::Afternoon);
        assert_eq!(table.bucket(16), TimeBucket::Afternoon);
        assert_eq!(table.bucket(17), TimeBucket::Evening);
        assert_eq!(table.bucket(20), TimeBucket::Evening);
        assert_eq!(table.bucket(21), TimeBucket::Night);
        assert_eq!(table.bucket(23), TimeBucket::Night);
    }

    #[test]
    fn test_alternate_buckets() {
        let table = BucketBoundaries::Alternate;
        assert_eq!(table.bucket(5), TimeBucket::Night);
        assert_eq!(table.bucket(6), TimeBucket::Morning);
        assert_eq!(table.bucket(17), TimeBucket::Afternoon);
        assert_eq!(table.bucket(18), TimeBucket::Evening);
        assert_eq!(table.bucket(23), TimeBucket::Evening);
    }

    #[test]
    fn test_boundaries_from_str() {
        assert_eq!("Alternate".parse::<BucketBoundaries>(), Ok(BucketBoundaries::Alternate));
        assert_eq!("standard".parse::<BucketBoundaries>(), Ok(BucketBoundaries::Standard));
        assert!("weird".parse::<BucketBoundaries>().is_err());
    }
}
