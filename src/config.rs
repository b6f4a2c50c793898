//! Runtime configuration
//!
//! The aggregation core has a single tunable, the timeline cap. The prefixes
//! describe where the surrounding I/O layer keeps observation documents,
//! summaries and thumbnails.

use crate::aggregator::DEFAULT_MAX_TIMELINE;
use crate::error::WrappedError;
use crate::normalizer::BucketBoundaries;
use serde::{Deserialize, Serialize};

/// Default number of fetch/merge/persist attempts per observation
pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 8;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrappedConfig {
    /// Cap on busiest-day timeline entries
    pub max_timeline: usize,
    /// Key prefix of observation documents that should be merged
    pub meta_prefix: String,
    /// Key prefix under which `<user>/wrapped.json` summaries live
    pub analytics_prefix: String,
    /// Key prefix of thumbnails referenced from the timeline
    pub thumb_prefix: String,
    /// Attempts before a contended update is reported as a conflict
    pub max_cas_attempts: u32,
    /// Time-of-day boundary table
    pub bucket_boundaries: BucketBoundaries,
}

impl Default for WrappedConfig {
    fn default() -> Self {
        Self {
            max_timeline: DEFAULT_MAX_TIMELINE,
            meta_prefix: "meta/".to_string(),
            analytics_prefix: "analytics/".to_string(),
            thumb_prefix: "thumbs/".to_string(),
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            bucket_boundaries: BucketBoundaries::Standard,
        }
    }
}

impl WrappedConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, WrappedError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from a variable lookup, defaulting unset values
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WrappedError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("MAX_TIMELINE") {
            config.max_timeline = raw
                .trim()
                .parse()
                .map_err(|_| WrappedError::Config(format!("MAX_TIMELINE={raw:?}")))?;
        }
        if let Some(prefix) = lookup("META_PREFIX") {
            config.meta_prefix = prefix;
        }
        if let Some(prefix) = lookup("ANALYTICS_PREFIX") {
            config.analytics_prefix = prefix;
        }
        if let Some(prefix) = lookup("THUMB_PREFIX") {
            config.thumb_prefix = prefix;
        }
        if let Some(raw) = lookup("MAX_CAS_ATTEMPTS") {
            config.max_cas_attempts = raw
                .trim()
                .parse()
                .map_err(|_| WrappedError::Config(format!("MAX_CAS_ATTEMPTS={raw:?}")))?;
        }
        if let Some(raw) = lookup("TIME_BUCKETS") {
            config.bucket_boundaries = raw.parse().map_err(WrappedError::Config)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WrappedError> {
        if self.max_cas_attempts == 0 {
            return Err(WrappedError::Config(
                "max_cas_attempts must be at least 1".to_string(),
            ));
        }
        if self.analytics_prefix.is_empty() || self.meta_prefix.is_empty() {
            return Err(WrappedError::Config(
                "meta and analytics prefixes must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WrappedConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, WrappedConfig::default());
        assert_eq!(config.max_timeline, 24);
        assert_eq!(config.meta_prefix, "meta/");
    }

    #[test]
    fn test_overrides() {
        let config = WrappedConfig::from_lookup(lookup_from(&[
            ("MAX_TIMELINE", "5"),
            ("ANALYTICS_PREFIX", "wrapped/"),
            ("TIME_BUCKETS", "alternate"),
            ("MAX_CAS_ATTEMPTS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.max_timeline, 5);
        assert_eq!(config.analytics_prefix, "wrapped/");
        assert_eq!(config.bucket_boundaries, BucketBoundaries::Alternate);
        assert_eq!(config.max_cas_attempts, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(WrappedConfig::from_lookup(lookup_from(&[("MAX_TIMELINE", "lots")])).is_err());
        assert!(WrappedConfig::from_lookup(lookup_from(&[("TIME_BUCKETS", "solar")])).is_err());
        assert!(WrappedConfig::from_lookup(lookup_from(&[("MAX_CAS_ATTEMPTS", "0")])).is_err());
    }
}
