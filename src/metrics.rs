//! Derived metrics
//!
//! Headline fields computed from a summary's histograms after every merge:
//! - Most common label
//! - Favourite colour
//! - Average photos per day over the observed date span
//!
//! Ties on the maximum count resolve to the lexicographically smallest key
//! (see [`Histogram::max_entry`](crate::types::Histogram::max_entry)).

use crate::types::{Rgb, UserSummary};
use chrono::NaiveDate;

/// Headline fields for one summary
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub most_common_label: Option<String>,
    pub favourite_color: Option<Rgb>,
    pub avg_photos_per_day: Option<f64>,
}

impl DerivedMetrics {
    /// Compute headline fields from the summary's current histograms
    pub fn compute(summary: &UserSummary) -> Self {
        Self {
            most_common_label: compute_most_common_label(summary),
            favourite_color: compute_favourite_color(summary),
            avg_photos_per_day: compute_avg_photos_per_day(summary),
        }
    }

    /// Overwrite the summary's derived fields
    pub fn apply_to(self, summary: &mut UserSummary) {
        summary.most_common_label = self.most_common_label;
        summary.favourite_color = self.favourite_color;
        summary.avg_photos_per_day = self.avg_photos_per_day;
    }
}

fn compute_most_common_label(summary: &UserSummary) -> Option<String> {
    summary
        .label_counts
        .max_entry()
        .map(|(label, _)| label.to_string())
}

fn compute_favourite_color(summary: &UserSummary) -> Option<Rgb> {
    summary
        .color_counts
        .max_entry()
        .and_then(|(key, _)| Rgb::from_color_key(key))
}

/// Total photos over the inclusive day span, rounded to 2 decimals with
/// halves going to the even digit
fn compute_avg_photos_per_day(summary: &UserSummary) -> Option<f64> {
    let first = NaiveDate::parse_from_str(summary.first_date.as_deref()?, "%Y-%m-%d").ok()?;
    let last = NaiveDate::parse_from_str(summary.last_date.as_deref()?, "%Y-%m-%d").ok()?;

    let days = (last - first).num_days() + 1;
    if days <= 0 {
        return None;
    }

    let avg = summary.total_photos as f64 / days as f64;
    Some((avg * 100.0).round_ties_even() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Histogram;

    fn make_summary() -> UserSummary {
        UserSummary {
            total_photos: 7,
            label_counts: Histogram::from_iter([("dog", 3), ("beach", 5), ("sky", 5)]),
            color_counts: Histogram::from_iter([("1,2,3", 4), ("200,100,0", 9)]),
            first_date: Some("2024-01-01".to_string()),
            last_date: Some("2024-01-03".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_most_common_label_tie_breaks_by_key() {
        let metrics = DerivedMetrics::compute(&make_summary());
        assert_eq!(metrics.most_common_label.as_deref(), Some("beach"));
    }

    #[test]
    fn test_favourite_color_decoded() {
        let metrics = DerivedMetrics::compute(&make_summary());
        assert_eq!(metrics.favourite_color, Some(Rgb::new(200, 100, 0)));
    }

    #[test]
    fn test_avg_rounded_to_two_decimals() {
        let metrics = DerivedMetrics::compute(&make_summary());
        // 7 / 3 = 2.333...
        assert_eq!(metrics.avg_photos_per_day, Some(2.33));
    }

    #[test]
    fn test_avg_halves_round_to_even() {
        let mut summary = make_summary();
        summary.last_date = Some("2024-01-08".to_string());

        // 1 / 8 = 0.125
        summary.total_photos = 1;
        assert_eq!(DerivedMetrics::compute(&summary).avg_photos_per_day, Some(0.12));

        // 5 / 8 = 0.625
        summary.total_photos = 5;
        assert_eq!(DerivedMetrics::compute(&summary).avg_photos_per_day, Some(0.62));

        // 3 / 8 = 0.375
        summary.total_photos = 3;
        assert_eq!(DerivedMetrics::compute(&summary).avg_photos_per_day, Some(0.38));
    }

    #[test]
    fn test_empty_summary_has_no_metrics() {
        let metrics = DerivedMetrics::compute(&UserSummary::skeleton());
        assert_eq!(metrics.most_common_label, None);
        assert_eq!(metrics.favourite_color, None);
        assert_eq!(metrics.avg_photos_per_day, None);
    }

    #[test]
    fn test_apply_overwrites_fields() {
        let mut summary = make_summary();
        summary.most_common_label = Some("stale".to_string());
        DerivedMetrics::compute(&summary).apply_to(&mut summary);
        assert_eq!(summary.most_common_label.as_deref(), Some("beach"));
        assert_eq!(summary.avg_photos_per_day, Some(2.33));
    }
}
