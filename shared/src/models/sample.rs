//! Raw sample model.
//!
//! A `RawSample` is one observation handed over by the load generator before
//! it is converted into an exported metric line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use validator::Validate;

/// A single producer-supplied observation.
///
/// # Example
///
/// ```
/// use shared::models::RawSample;
///
/// let sample = RawSample::new("http_req_duration", 123.4)
///     .with_tag("method", "GET")
///     .with_unit("MilliSecond");
///
/// assert!(sample.validate_sample().is_ok());
/// assert!(sample.assigned_timestamp().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    /// The metric name, without the export prefix.
    #[validate(length(min = 1, message = "Sample name cannot be empty"))]
    pub name: String,

    /// The observed value.
    pub value: f64,

    /// Tags attached by the producer.
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// When the observation was made. Absent means "assign at conversion".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Optional unit of the metric (e.g. "MilliSecond", "Byte").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Optional human-readable description of the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional display name of the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Errors that can occur during sample validation.
#[derive(Debug, Error)]
pub enum SampleValidationError {
    /// The sample name is empty.
    #[error("Sample name cannot be empty")]
    EmptyName,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl RawSample {
    /// Creates a new sample without a timestamp.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: HashMap::new(),
            timestamp: None,
            unit: None,
            description: None,
            display_name: None,
        }
    }

    /// Adds a tag to the sample.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the observation time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Returns the timestamp if one has been assigned.
    ///
    /// The Unix epoch (and anything before it) counts as unassigned.
    #[must_use]
    pub fn assigned_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.filter(|ts| ts.timestamp_millis() > 0)
    }

    /// Validates the sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty.
    pub fn validate_sample(&self) -> Result<(), SampleValidationError> {
        if self.name.is_empty() {
            return Err(SampleValidationError::EmptyName);
        }

        self.validate()?;
        Ok(())
    }
}
