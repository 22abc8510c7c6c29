//! Exported metric model and line protocol rendering.
//!
//! Each `ExportedMetric` renders to exactly one line of the Dynatrace metrics
//! ingest format:
//!
//! ```text
//! k6.http_reqs,method="GET",status="200" dt.meta.unit=Count 1 1705314600000
//! ```

use std::collections::HashMap;
use std::fmt::{self, Write};

/// Prefix prepended to every sample name to form the metric key.
pub const METRIC_KEY_PREFIX: &str = "k6.";

/// Metadata property carrying the unit.
pub const UNIT_PROPERTY: &str = "dt.meta.unit";

/// Metadata property carrying the description.
pub const DESCRIPTION_PROPERTY: &str = "dt.meta.description";

/// Metadata property carrying the display name.
pub const DISPLAY_NAME_PROPERTY: &str = "dt.meta.displayName";

/// A metric data point ready to be rendered onto the wire.
///
/// # Example
///
/// ```
/// use shared::models::ExportedMetric;
///
/// let metric = ExportedMetric::new("k6.vus", 5.0, 1_700_000_000_000)
///     .with_dimension("scenario", "default")
///     .with_unit("Count");
///
/// assert_eq!(
///     metric.render(),
///     r#"k6.vus,scenario="default" dt.meta.unit=Count 5 1700000000000"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedMetric {
    /// The prefixed metric key.
    pub key: String,

    /// Optional display name.
    pub display_name: Option<String>,

    /// Optional description.
    pub description: Option<String>,

    /// Optional unit.
    pub unit: Option<String>,

    /// Dimensions attached to the line.
    pub dimensions: HashMap<String, String>,

    /// The metric value.
    pub value: f64,

    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl ExportedMetric {
    /// Creates a metric with no dimensions or metadata.
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64, timestamp_ms: i64) -> Self {
        Self {
            key: key.into(),
            display_name: None,
            description: None,
            unit: None,
            dimensions: HashMap::new(),
            value,
            timestamp_ms,
        }
    }

    /// Adds a dimension.
    #[must_use]
    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.into(), value.into());
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

    /// Renders the metric as a single line, without a trailing newline.
    ///
    /// Rendering is pure: the timestamp is whatever was assigned at
    /// conversion, and dimension order follows map iteration.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExportedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;

        for (key, value) in &self.dimensions {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            write!(f, ",{key}=")?;
            write_quoted(f, value)?;
        }

        let mut separator = ' ';
        if let Some(unit) = non_empty(self.unit.as_deref()) {
            write!(f, "{separator}{UNIT_PROPERTY}={unit}")?;
            separator = ',';
        }
        if let Some(description) = non_empty(self.description.as_deref()) {
            write!(f, "{separator}{DESCRIPTION_PROPERTY}=")?;
            write_quoted(f, description)?;
            separator = ',';
        }
        if let Some(display_name) = non_empty(self.display_name.as_deref()) {
            write!(f, "{separator}{DISPLAY_NAME_PROPERTY}=")?;
            write_quoted(f, display_name)?;
        }

        write!(f, " {} {}", self.value, self.timestamp_ms)
    }
}

/// Renders a batch of metrics as a request body, one newline-terminated line
/// per metric.
#[must_use]
pub fn render_payload(metrics: &[ExportedMetric]) -> String {
    let mut payload = String::with_capacity(metrics.len() * 64);
    for metric in metrics {
        // Writing into a String cannot fail.
        let _ = writeln!(payload, "{metric}");
    }
    payload
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn dimension_segment(line: &str) -> HashSet<String> {
        let head = line.split(' ').next().unwrap();
        head.split(',').skip(1).map(str::to_string).collect()
    }

    #[test]
    fn test_render_without_dimensions_or_properties() {
        let metric = ExportedMetric::new("k6.cpu_usage", 3.2, 1_700_000_000_000);
        assert_eq!(metric.render(), "k6.cpu_usage 3.2 1700000000000");
    }

    #[test]
    fn test_render_dimensions_as_set() {
        let metric = ExportedMetric::new("k6.http_reqs", 1.0, 42)
            .with_dimension("method", "GET")
            .with_dimension("status", "200")
            .with_dimension("expected_response", "true");

        let line = metric.render();
        let expected: HashSet<String> = [
            r#"method="GET""#,
            r#"status="200""#,
            r#"expected_response="true""#,
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        assert!(line.starts_with("k6.http_reqs,"));
        assert_eq!(dimension_segment(&line), expected);
        assert!(line.ends_with(" 1 42"));
    }

    #[test]
    fn test_render_skips_empty_dimension_sides() {
        let metric = ExportedMetric::new("k6.vus", 2.0, 7)
            .with_dimension("", "orphan")
            .with_dimension("group", "")
            .with_dimension("scenario", "load");

        let line = metric.render();
        assert_eq!(line, r#"k6.vus,scenario="load" 2 7"#);
        assert!(!line.contains(",="));
        assert!(!line.contains("=,"));
    }

    #[test]
    fn test_render_property_order() {
        let metric = ExportedMetric::new("k6.http_req_duration", 12.5, 100)
            .with_display_name("Request duration")
            .with_description("Total time for the request")
            .with_unit("MilliSecond");

        assert_eq!(
            metric.render(),
            "k6.http_req_duration dt.meta.unit=MilliSecond,\
             dt.meta.description=\"Total time for the request\",\
             dt.meta.displayName=\"Request duration\" 12.5 100"
        );
    }

    #[test]
    fn test_render_single_property_has_no_leading_comma() {
        let metric = ExportedMetric::new("k6.data_sent", 512.0, 1).with_description("bytes out");
        assert_eq!(
            metric.render(),
            r#"k6.data_sent dt.meta.description="bytes out" 512 1"#
        );

        let metric = ExportedMetric::new("k6.data_sent", 512.0, 1).with_unit("");
        assert_eq!(metric.render(), "k6.data_sent 512 1");
    }

    #[test]
    fn test_render_escapes_quotes() {
        let metric = ExportedMetric::new("k6.checks", 1.0, 1).with_dimension("check", r#"is "ok"\"#);
        assert_eq!(metric.render(), r#"k6.checks,check="is \"ok\"\\" 1 1"#);
    }

    #[test]
    fn test_render_value_shortest_form() {
        assert!(ExportedMetric::new("k", 0.1, 1).render().contains(" 0.1 "));
        assert!(ExportedMetric::new("k", 100.0, 1).render().contains(" 100 "));
        assert!(ExportedMetric::new("k", -2.5, 1).render().contains(" -2.5 "));
    }

    #[test]
    fn test_render_is_deterministic() {
        let metric = ExportedMetric::new("k6.iterations", 1.0, 1_700_000_000_000)
            .with_dimension("scenario", "default");
        assert_eq!(metric.render(), metric.render());
    }

    #[test]
    fn test_render_payload() {
        let metrics = vec![
            ExportedMetric::new("k6.a", 1.0, 10),
            ExportedMetric::new("k6.b", 2.0, 20),
        ];
        assert_eq!(render_payload(&metrics), "k6.a 1 10\nk6.b 2 20\n");
        assert_eq!(render_payload(&[]), "");
    }
}
