//! Sample to metric conversion.
//!
//! Conversion never fails. Empty tags and tags excluded by the retention
//! policy are dropped, characters the line format cannot carry unquoted are
//! replaced in names, tag keys and units, and a missing timestamp is filled
//! with the wall clock at conversion time.

use chrono::Utc;

use crate::models::{ExportedMetric, RawSample, METRIC_KEY_PREFIX};

/// Tag carrying the request name.
pub const NAME_TAG: &str = "name";

/// Tag carrying the request URL.
pub const URL_TAG: &str = "url";

/// Which producer tags survive as dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagPolicy {
    /// Keep tags at all. When false, every metric is exported without dimensions.
    pub keep_tags: bool,
    /// Keep the `name` tag.
    pub keep_name_tag: bool,
    /// Keep the `url` tag.
    pub keep_url_tag: bool,
}

impl TagPolicy {
    /// Returns true if a tag with the given key should become a dimension.
    #[must_use]
    pub fn retains(&self, key: &str) -> bool {
        if !self.keep_tags {
            return false;
        }
        match key {
            NAME_TAG => self.keep_name_tag,
            URL_TAG => self.keep_url_tag,
            _ => true,
        }
    }
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self {
            keep_tags: true,
            keep_name_tag: false,
            keep_url_tag: true,
        }
    }
}

/// Converts raw samples into exported metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricConverter {
    policy: TagPolicy,
}

impl MetricConverter {
    /// Creates a converter applying the given tag policy.
    #[must_use]
    pub fn new(policy: TagPolicy) -> Self {
        Self { policy }
    }

    /// Returns the tag policy in use.
    #[must_use]
    pub fn policy(&self) -> TagPolicy {
        self.policy
    }

    /// Converts one sample.
    #[must_use]
    pub fn convert(&self, sample: RawSample) -> ExportedMetric {
        let timestamp_ms = sample
            .assigned_timestamp()
            .unwrap_or_else(Utc::now)
            .timestamp_millis();

        let dimensions = sample
            .tags
            .into_iter()
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .filter(|(key, _)| self.policy.retains(key))
            .map(|(key, value)| (sanitize_token(&key), value))
            .collect();

        ExportedMetric {
            key: format!("{METRIC_KEY_PREFIX}{}", sanitize_token(&sample.name)),
            display_name: sample.display_name,
            description: sample.description,
            unit: sample.unit.as_deref().map(sanitize_token),
            dimensions,
            value: sample.value,
            timestamp_ms,
        }
    }
}

/// Replaces every character that is not allowed unquoted in a metric line.
///
/// Keys, dimension keys and units are written without quoting, so anything
/// outside `[A-Za-z0-9_.:-]` becomes `_`.
///
/// # Example
///
/// ```
/// use shared::convert::sanitize_token;
///
/// assert_eq!(sanitize_token("http reqs"), "http_reqs");
/// assert_eq!(sanitize_token("a=b,c"), "a_b_c");
/// assert_eq!(sanitize_token("group::setup"), "group::setup");
/// ```
#[must_use]
pub fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
