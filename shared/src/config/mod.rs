//! Configuration module for the Dynatrace writer.
//!
//! Configuration is resolved from three sources, in ascending precedence:
//!
//! 1. built-in defaults overridden by a JSON object,
//! 2. `K6_DYNATRACE_*` environment variables,
//! 3. an inline `key=value,...` argument string.
//!
//! A later source only overrides the fields it explicitly sets. Headers merge
//! entry by entry. Every source is parsed and validated before anything is
//! applied, so resolution either yields a complete [`Config`] or an error.

pub mod layer;
pub mod parse;
pub mod request;

pub use layer::ConfigLayer;
pub use parse::{parse_bool, parse_duration};
pub use request::{RequestConfig, RequestConfigError, TlsSettings};

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::convert::TagPolicy;

/// Default interval between two flushes.
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(10);

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A duration value could not be parsed.
    #[error("invalid duration '{value}': {source}")]
    InvalidDuration {
        /// The raw value as supplied.
        value: String,
        /// The underlying parse error.
        source: humantime::DurationError,
    },

    /// A boolean value could not be parsed.
    #[error("invalid boolean for {field}: '{value}'")]
    InvalidBool {
        /// The configuration field.
        field: String,
        /// The raw value as supplied.
        value: String,
    },

    /// The resolved flush period is zero.
    #[error("flush period must be greater than zero")]
    NonPositiveFlushPeriod,

    /// The JSON configuration is malformed.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// An argument pair is not of the form `key=value`.
    #[error("invalid argument '{0}', expected key=value")]
    InvalidArgument(String),

    /// An argument key is not recognized.
    #[error("unknown argument key '{0}'")]
    UnknownArgument(String),

    /// A header entry is malformed.
    #[error("invalid header in {source_name}: '{value}', expected 'Name: value'")]
    InvalidHeader {
        /// Where the header came from.
        source_name: String,
        /// The raw value as supplied.
        value: String,
    },
}

/// The resolved writer configuration.
///
/// # Example
///
/// ```
/// use shared::config::Config;
/// use std::collections::HashMap;
/// use std::time::Duration;
///
/// let config = Config::resolve(
///     Some(r#"{"url": "https://h/api", "headers": {"X-Header": "v1"}}"#),
///     &HashMap::new(),
///     "flushPeriod=2s,headers.X-Header=v2",
/// )
/// .unwrap();
///
/// assert_eq!(config.url.as_deref(), Some("https://h/api"));
/// assert_eq!(config.flush_period, Duration::from_secs(2));
/// assert_eq!(config.headers["X-Header"], "v2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Destination URL. Parsed when the request configuration is derived.
    pub url: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
    /// Path to a PEM CA certificate to trust.
    pub ca_cert_file: Option<String>,
    /// API token sent as `Authorization: Api-Token <token>`.
    pub api_token: Option<String>,
    /// Interval between two flushes.
    pub flush_period: Duration,
    /// Additional request headers.
    pub headers: HashMap<String, String>,
    /// Keep tags as dimensions.
    pub keep_tags: bool,
    /// Keep the `name` tag.
    pub keep_name_tag: bool,
    /// Keep the `url` tag.
    pub keep_url_tag: bool,
}

impl Default for Config {
    fn default() -> Self {
        let policy = TagPolicy::default();
        Self {
            url: None,
            insecure_skip_tls_verify: false,
            ca_cert_file: None,
            api_token: None,
            flush_period: DEFAULT_FLUSH_PERIOD,
            headers: HashMap::new(),
            keep_tags: policy.keep_tags,
            keep_name_tag: policy.keep_name_tag,
            keep_url_tag: policy.keep_url_tag,
        }
    }
}

impl Config {
    /// Resolves the configuration from all three sources.
    ///
    /// # Arguments
    ///
    /// * `json` - Optional JSON object; blank input counts as absent
    /// * `env` - Environment snapshot
    /// * `arg` - Inline argument string; may be empty
    ///
    /// # Errors
    ///
    /// Returns the first error found in any source. No partial configuration
    /// is ever returned.
    pub fn resolve(
        json: Option<&str>,
        env: &HashMap<String, String>,
        arg: &str,
    ) -> Result<Self, ConfigError> {
        let json_layer = match json.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => ConfigLayer::from_json(raw)?,
            None => ConfigLayer::default(),
        };
        let layers = [
            json_layer,
            ConfigLayer::from_env(env)?,
            ConfigLayer::from_arg(arg)?,
        ];

        let mut config = Self::default();
        for layer in layers {
            layer.apply_to(&mut config);
        }

        if config.flush_period.is_zero() {
            return Err(ConfigError::NonPositiveFlushPeriod);
        }

        tracing::debug!(
            url = config.url.as_deref().unwrap_or_default(),
            flush_period = ?config.flush_period,
            headers = config.headers.len(),
            insecure_skip_tls_verify = config.insecure_skip_tls_verify,
            "Resolved writer configuration"
        );

        Ok(config)
    }

    /// Returns the tag retention policy described by this configuration.
    #[must_use]
    pub fn tag_policy(&self) -> TagPolicy {
        TagPolicy {
            keep_tags: self.keep_tags,
            keep_name_tag: self.keep_name_tag,
            keep_url_tag: self.keep_url_tag,
        }
    }

    /// Derives the transport-ready request configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is configured or the URL cannot be parsed.
    pub fn request_config(&self) -> Result<RequestConfig, RequestConfigError> {
        RequestConfig::from_config(self)
    }
}
