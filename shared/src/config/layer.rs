//! Configuration layers.
//!
//! Each source (JSON object, environment, argument string) is parsed into a
//! `ConfigLayer` holding only the fields that source explicitly sets. Layers
//! are then applied onto the defaults in precedence order, one field at a time.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::parse::{parse_bool, parse_duration};
use super::{Config, ConfigError};

/// Prefix shared by every environment variable the writer reads.
pub const ENV_PREFIX: &str = "K6_DYNATRACE_";

/// Environment variable holding a single `Name: value` header.
pub const ENV_HEADER: &str = "K6_DYNATRACE_HEADER";

/// Prefix of environment variables that each set one named header.
pub const ENV_HEADERS_PREFIX: &str = "K6_DYNATRACE_HEADERS_";

/// Argument key prefix that sets one named header.
pub const ARG_HEADERS_PREFIX: &str = "headers.";

/// The fields one configuration source sets explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    /// Destination URL.
    pub url: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: Option<bool>,
    /// Path to a PEM CA certificate.
    pub ca_cert_file: Option<String>,
    /// API token.
    pub api_token: Option<String>,
    /// Flush period.
    pub flush_period: Option<Duration>,
    /// Header entries set by this layer.
    pub headers: HashMap<String, String>,
    /// Keep tags as dimensions.
    pub keep_tags: Option<bool>,
    /// Keep the `name` tag.
    pub keep_name_tag: Option<bool>,
    /// Keep the `url` tag.
    pub keep_url_tag: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonLayer {
    url: Option<String>,
    #[serde(rename = "insecureSkipTLSVerify")]
    insecure_skip_tls_verify: Option<bool>,
    #[serde(rename = "caCertFile")]
    ca_cert_file: Option<String>,
    #[serde(rename = "apitoken")]
    api_token: Option<String>,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(rename = "flushPeriod")]
    flush_period: Option<JsonDuration>,
    #[serde(rename = "keepTags")]
    keep_tags: Option<bool>,
    #[serde(rename = "keepNameTag")]
    keep_name_tag: Option<bool>,
    #[serde(rename = "keepUrlTag")]
    keep_url_tag: Option<bool>,
}

/// A JSON flush period: a duration string or a number of milliseconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonDuration {
    Millis(u64),
    FractionalMillis(f64),
    Text(String),
}

impl JsonDuration {
    fn into_duration(self) -> Result<Duration, ConfigError> {
        match self {
            Self::Millis(millis) => Ok(Duration::from_millis(millis)),
            Self::FractionalMillis(millis) => fractional_millis(millis),
            Self::Text(text) => parse_duration(&text),
        }
    }
}

/// Converts a possibly fractional millisecond count, rounded to the nearest
/// nanosecond. Negative or out-of-range values are reported through
/// [`parse_duration`] so the error names the raw value.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fractional_millis(millis: f64) -> Result<Duration, ConfigError> {
    let nanos = (millis * 1_000_000.0).round();
    if nanos.is_finite() && nanos >= 0.0 && nanos < u64::MAX as f64 {
        Ok(Duration::from_nanos(nanos as u64))
    } else {
        parse_duration(&millis.to_string())
    }
}

impl ConfigLayer {
    /// Parses a JSON configuration object.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid configuration object
    /// or if `flushPeriod` cannot be parsed.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let json: JsonLayer = serde_json::from_str(raw)?;

        let flush_period = json
            .flush_period
            .map(JsonDuration::into_duration)
            .transpose()?;

        Ok(Self {
            url: json.url,
            insecure_skip_tls_verify: json.insecure_skip_tls_verify,
            ca_cert_file: json.ca_cert_file,
            api_token: json.api_token,
            flush_period,
            headers: json.headers.unwrap_or_default(),
            keep_tags: json.keep_tags,
            keep_name_tag: json.keep_name_tag,
            keep_url_tag: json.keep_url_tag,
        })
    }

    /// Reads the `K6_DYNATRACE_*` variables from an environment snapshot.
    ///
    /// Variables set to an empty string are treated as unset.
    /// `K6_DYNATRACE_HEADERS_<Name>` sets header `<Name>`; `K6_DYNATRACE_HEADER`
    /// holds one `Name: value` pair and wins over a `HEADERS_` variable of the
    /// same name. A bare value such as `K6_DYNATRACE_HEADER=token` carries no
    /// header name and is rejected rather than ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration or boolean variable is malformed, or if
    /// `K6_DYNATRACE_HEADER` has no `:` separator or an empty name.
    pub fn from_env(env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let var = |suffix: &str| {
            env.get(&format!("{ENV_PREFIX}{suffix}"))
                .map(String::as_str)
                .filter(|value| !value.is_empty())
        };
        let flag = |suffix: &str, field: &str| var(suffix).map(|v| parse_bool(field, v)).transpose();

        let mut headers: HashMap<String, String> = env
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(ENV_HEADERS_PREFIX)?;
                (!name.is_empty() && !value.is_empty()).then(|| (name.to_string(), value.clone()))
            })
            .collect();

        if let Some(raw) = var("HEADER") {
            let (name, value) = raw
                .split_once(':')
                .map(|(name, value)| (name.trim(), value.trim()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| ConfigError::InvalidHeader {
                    source_name: ENV_HEADER.to_string(),
                    value: raw.to_string(),
                })?;
            headers.insert(name.to_string(), value.to_string());
        }

        Ok(Self {
            url: var("URL").map(str::to_string),
            insecure_skip_tls_verify: flag("INSECURE_SKIP_TLS_VERIFY", "insecureSkipTLSVerify")?,
            ca_cert_file: var("CA_CERT_FILE").map(str::to_string),
            api_token: var("APITOKEN").map(str::to_string),
            flush_period: var("FLUSH_PERIOD").map(parse_duration).transpose()?,
            headers,
            keep_tags: flag("KEEP_TAGS", "keepTags")?,
            keep_name_tag: flag("KEEP_NAME_TAG", "keepNameTag")?,
            keep_url_tag: flag("KEEP_URL_TAG", "keepUrlTag")?,
        })
    }

    /// Parses an inline argument string such as
    /// `url=https://host/api,flushPeriod=2s,headers.X-Header=value`.
    ///
    /// Pairs are applied left to right, so a repeated key keeps its last value.
    ///
    /// # Errors
    ///
    /// Returns an error for a pair without `=`, an unknown key, or a value that
    /// fails to parse.
    pub fn from_arg(arg: &str) -> Result<Self, ConfigError> {
        let mut layer = Self::default();

        for pair in arg.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidArgument(pair.to_string()))?;

            match key {
                "url" => layer.url = Some(value.to_string()),
                "insecureSkipTLSVerify" => {
                    layer.insecure_skip_tls_verify = Some(parse_bool(key, value)?);
                }
                "caCertFile" => layer.ca_cert_file = Some(value.to_string()),
                "apitoken" => layer.api_token = Some(value.to_string()),
                "flushPeriod" => layer.flush_period = Some(parse_duration(value)?),
                "keepTags" => layer.keep_tags = Some(parse_bool(key, value)?),
                "keepNameTag" => layer.keep_name_tag = Some(parse_bool(key, value)?),
                "keepUrlTag" => layer.keep_url_tag = Some(parse_bool(key, value)?),
                _ => match key.strip_prefix(ARG_HEADERS_PREFIX) {
                    Some(name) if !name.is_empty() => {
                        layer.headers.insert(name.to_string(), value.to_string());
                    }
                    Some(_) => return Err(ConfigError::InvalidArgument(pair.to_string())),
                    None => return Err(ConfigError::UnknownArgument(key.to_string())),
                },
            }
        }

        Ok(layer)
    }

    /// Applies the fields this layer sets onto `config`.
    pub fn apply_to(self, config: &mut Config) {
        merge_option(&mut config.url, self.url);
        merge_value(&mut config.insecure_skip_tls_verify, self.insecure_skip_tls_verify);
        merge_option(&mut config.ca_cert_file, self.ca_cert_file);
        merge_option(&mut config.api_token, self.api_token);
        merge_value(&mut config.flush_period, self.flush_period);
        merge_headers(&mut config.headers, self.headers);
        merge_value(&mut config.keep_tags, self.keep_tags);
        merge_value(&mut config.keep_name_tag, self.keep_name_tag);
        merge_value(&mut config.keep_url_tag, self.keep_url_tag);
    }
}

/// Overrides a defaulted field if the layer sets it.
fn merge_value<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Overrides an optional field if the layer sets it.
fn merge_option<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Adds or overrides individual header entries; entries the layer does not
/// mention are kept.
fn merge_headers(target: &mut HashMap<String, String>, headers: HashMap<String, String>) {
    target.extend(headers);
}
