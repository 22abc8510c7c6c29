//! Delivery of rendered payloads to the metrics ingest endpoint.
//!
//! A [`Transport`] receives one newline-separated payload per flush cycle.
//! [`HttpSender`] POSTs it with `reqwest`. Any HTTP response, whatever its
//! status, counts as a completed delivery; only transport-level failures are
//! errors, and they are never retried here.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use shared::config::{RequestConfig, TlsSettings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Content type of the line protocol payload.
pub const PAYLOAD_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a delivery that reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// HTTP status code returned by the backend.
    pub status: u16,
    /// Response body, as text.
    pub body: String,
}

impl DeliveryReport {
    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors raised while delivering a payload.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be completed (connection, TLS, timeout).
    #[error("request to {url} failed: {source}")]
    Request {
        /// Destination URL.
        url: String,
        /// The underlying client error.
        source: reqwest::Error,
    },

    /// The transport is not able to deliver.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while building the HTTP client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// The CA certificate file could not be read.
    #[error("failed to read CA certificate {}: {source}", path.display())]
    CaCertRead {
        /// Path of the certificate file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The CA certificate is not valid PEM.
    #[error("invalid CA certificate {}: {source}", path.display())]
    CaCertParse {
        /// Path of the certificate file.
        path: PathBuf,
        /// The underlying client error.
        source: reqwest::Error,
    },

    /// A configured header name is not a valid HTTP header name.
    #[error("invalid header name '{0}'")]
    HeaderName(String),

    /// A configured header value is not a valid HTTP header value.
    #[error("invalid value for header '{0}'")]
    HeaderValue(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Something that can deliver a rendered payload.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload did not reach the backend.
    async fn deliver(&self, payload: String) -> Result<DeliveryReport, TransportError>;
}

/// Delivers payloads with an HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    url: Url,
}

impl HttpSender {
    /// Builds a sender from the request configuration.
    ///
    /// Every configured header, including the authorization header, is sent
    /// with each request.
    ///
    /// # Errors
    ///
    /// Returns an error if a header is invalid, the CA certificate cannot be
    /// loaded, or the client cannot be built.
    pub fn new(request: &RequestConfig) -> Result<Self, ClientBuildError> {
        let mut builder = reqwest::Client::builder()
            .default_headers(header_map(&request.headers)?)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);
        builder = apply_tls(builder, &request.tls)?;

        Ok(Self {
            client: builder.build()?,
            url: request.url.clone(),
        })
    }

    /// The destination URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpSender {
    async fn deliver(&self, payload: String) -> Result<DeliveryReport, TransportError> {
        tracing::trace!(payload = %payload, "Payload to send");

        let response = self
            .client
            .post(self.url.clone())
            .body(payload)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: self.url.to_string(),
                source,
            })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| format!("{name}={}", value.to_str().unwrap_or("<binary>")))
            .collect::<Vec<_>>()
            .join("\n");
        tracing::debug!(status = %status, "Response status");
        tracing::debug!(headers = %headers, "Response headers");

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read response body");
                String::new()
            }
        };
        tracing::debug!(body = %body, "Response body");

        Ok(DeliveryReport {
            status: status.as_u16(),
            body,
        })
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ClientBuildError> {
    let mut map = HeaderMap::with_capacity(headers.len() + 1);
    map.insert(CONTENT_TYPE, HeaderValue::from_static(PAYLOAD_CONTENT_TYPE));

    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ClientBuildError::HeaderName(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ClientBuildError::HeaderValue(name.clone()))?;
        map.insert(header_name, header_value);
    }

    Ok(map)
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsSettings,
) -> Result<reqwest::ClientBuilder, ClientBuildError> {
    if tls.insecure_skip_verify {
        tracing::warn!("TLS certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(path) = &tls.ca_cert_file {
        let pem = std::fs::read(path).map_err(|source| ClientBuildError::CaCertRead {
            path: path.clone(),
            source,
        })?;
        let cert = reqwest::Certificate::from_pem(&pem).map_err(|source| {
            ClientBuildError::CaCertParse {
                path: path.clone(),
                source,
            }
        })?;
        builder = builder.add_root_certificate(cert);
    }

    Ok(builder)
}
