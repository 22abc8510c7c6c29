//! Data models for the Dynatrace writer.
//!
//! This module contains the raw sample handed over by producers and the
//! exported metric rendered onto the wire.

pub mod metric;
pub mod sample;

pub use metric::{render_payload, ExportedMetric, METRIC_KEY_PREFIX};
pub use sample::{RawSample, SampleValidationError};
