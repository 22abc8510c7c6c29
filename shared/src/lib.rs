//! Dynatrace Writer Shared Library
//!
//! This crate contains the types shared by the export pipeline and the CLI:
//! sample and metric models, the line protocol, and configuration resolution.
//!
//! # Modules
//!
//! - [`models`] - Raw samples and exported metrics
//! - [`convert`] - Sample to metric conversion and tag retention
//! - [`config`] - Layered configuration resolution
//!
//! # Example
//!
//! ```
//! use shared::convert::MetricConverter;
//! use shared::models::RawSample;
//!
//! let sample = RawSample::new("http_reqs", 1.0).with_tag("method", "GET");
//! let line = MetricConverter::default().convert(sample).render();
//!
//! assert!(line.starts_with(r#"k6.http_reqs,method="GET" 1 "#));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod convert;
pub mod models;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
