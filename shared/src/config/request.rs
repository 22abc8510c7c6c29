//! Request configuration derived from a resolved [`Config`].
//!
//! The destination URL is only parsed here, so a bad URL surfaces as a
//! [`RequestConfigError`] when the transport is being set up, not as a
//! [`ConfigError`](super::ConfigError) during resolution.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use super::Config;

/// Header carrying the API token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Errors raised while deriving the request configuration.
#[derive(Debug, Error)]
pub enum RequestConfigError {
    /// No destination URL was configured in any source.
    #[error("no destination url configured")]
    MissingUrl,

    /// The destination URL does not parse.
    #[error("invalid destination url '{value}': {source}")]
    InvalidUrl {
        /// The raw URL.
        value: String,
        /// The underlying parse error.
        source: url::ParseError,
    },
}

/// TLS settings for the HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Accept any server certificate.
    pub insecure_skip_verify: bool,
    /// Extra PEM CA certificate to trust.
    pub ca_cert_file: Option<PathBuf>,
}

/// Everything the transport needs to issue a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Parsed destination URL.
    pub url: Url,
    /// Final request headers, including the authorization header.
    pub headers: HashMap<String, String>,
    /// TLS settings.
    pub tls: TlsSettings,
}

impl RequestConfig {
    /// Derives the request configuration from a resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or does not parse.
    pub fn from_config(config: &Config) -> Result<Self, RequestConfigError> {
        let raw = config
            .url
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .ok_or(RequestConfigError::MissingUrl)?;
        let url = Url::parse(raw).map_err(|source| RequestConfigError::InvalidUrl {
            value: raw.to_string(),
            source,
        })?;

        let mut headers = config.headers.clone();
        if let Some(token) = config.api_token.as_deref().filter(|t| !t.is_empty()) {
            headers.retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION_HEADER));
            headers.insert(
                AUTHORIZATION_HEADER.to_string(),
                format!("Api-Token {token}"),
            );
        }

        Ok(Self {
            url,
            headers,
            tls: TlsSettings {
                insecure_skip_verify: config.insecure_skip_tls_verify,
                ca_cert_file: config.ca_cert_file.as_ref().map(PathBuf::from),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_url(url: &str) -> Config {
        Config {
            url: Some(url.to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_request_config_parses_url() {
        let request = RequestConfig::from_config(&config_with_url("https://h/api")).unwrap();
        assert_eq!(request.url.as_str(), "https://h/api");
        assert!(request.headers.is_empty());
        assert_eq!(request.tls, TlsSettings::default());
    }

    #[test]
    fn test_request_config_missing_url() {
        let result = RequestConfig::from_config(&Config::default());
        assert!(matches!(result, Err(RequestConfigError::MissingUrl)));

        let result = RequestConfig::from_config(&config_with_url(""));
        assert!(matches!(result, Err(RequestConfigError::MissingUrl)));
    }

    #[test]
    fn test_request_config_invalid_url() {
        let result = RequestConfig::from_config(&config_with_url("some-url"));
        match result {
            Err(RequestConfigError::InvalidUrl { value, .. }) => assert_eq!(value, "some-url"),
            other => panic!("expected invalid url, got {other:?}"),
        }
    }

    #[test]
    fn test_request_config_adds_token_header() {
        let mut config = config_with_url("https://h/api");
        config.api_token = Some("dt0c01.abc".to_string());
        config
            .headers
            .insert("authorization".to_string(), "Basic xyz".to_string());
        config
            .headers
            .insert("X-Header".to_string(), "value".to_string());

        let request = config.request_config().unwrap();

        assert_eq!(request.headers.len(), 2);
        assert_eq!(
            request.headers.get(AUTHORIZATION_HEADER),
            Some(&"Api-Token dt0c01.abc".to_string())
        );
        assert_eq!(request.headers.get("X-Header"), Some(&"value".to_string()));
    }

    #[test]
    fn test_request_config_tls_settings() {
        let mut config = config_with_url("https://h/api");
        config.insecure_skip_tls_verify = true;
        config.ca_cert_file = Some("certs/ca.pem".to_string());

        let request = config.request_config().unwrap();

        assert!(request.tls.insecure_skip_verify);
        assert_eq!(
            request.tls.ca_cert_file,
            Some(PathBuf::from("certs/ca.pem"))
        );
    }
}
