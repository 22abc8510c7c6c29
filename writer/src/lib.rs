//! Dynatrace Writer Export Pipeline
//!
//! This crate exports a stream of load-test samples to the Dynatrace metrics
//! ingest API without blocking the producer.
//!
//! # Architecture
//!
//! - [`buffer::ExportBuffer`] collects samples from any number of producers
//! - [`scheduler::FlushScheduler`] drains the buffer once per flush period
//! - [`sender::HttpSender`] POSTs the rendered lines to the backend
//!
//! [`Output`] wires these together from the three configuration sources.
//!
//! # Example
//!
//! ```no_run
//! use shared::models::RawSample;
//! use writer::{Output, OutputParams};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let output = Output::new(OutputParams::from_process_env(
//!         None,
//!         "url=https://abc123.live.dynatrace.com/api/v2/metrics/ingest,flushPeriod=5s",
//!     ))?;
//!     output.start()?;
//!     output.add_sample(RawSample::new("vus", 10.0));
//!     output.stop().await;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod buffer;
pub mod scheduler;
pub mod sender;

pub use buffer::ExportBuffer;
pub use scheduler::{FlushCycle, FlushScheduler, Flusher, SchedulerState};
pub use sender::{DeliveryReport, HttpSender, Transport, TransportError};

use shared::config::{Config, ConfigError, RequestConfigError};
use shared::convert::MetricConverter;
use shared::models::RawSample;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::sender::ClientBuildError;

/// Errors raised while creating or driving an [`Output`].
#[derive(Debug, Error)]
pub enum OutputError {
    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The request configuration could not be derived.
    #[error("request configuration error: {0}")]
    Request(#[from] RequestConfigError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] ClientBuildError),

    /// `start` was called on a running output.
    #[error("output already started")]
    AlreadyStarted,

    /// `start` was called after `stop`.
    #[error("output has been stopped")]
    Stopped,
}

/// Raw inputs handed over by the host process.
#[derive(Debug, Clone, Default)]
pub struct OutputParams {
    /// JSON configuration object, if any.
    pub json_config: Option<String>,
    /// Environment snapshot.
    pub environment: HashMap<String, String>,
    /// Inline `key=value,...` argument string.
    pub config_argument: String,
}

impl OutputParams {
    /// Builds parameters using the current process environment.
    #[must_use]
    pub fn from_process_env(json_config: Option<String>, config_argument: &str) -> Self {
        Self {
            json_config,
            environment: std::env::vars().collect(),
            config_argument: config_argument.to_string(),
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    scheduler: Option<Arc<FlushScheduler>>,
    stopped: bool,
}

/// Streams samples to Dynatrace on a fixed period.
pub struct Output {
    config: Config,
    buffer: Arc<ExportBuffer>,
    transport: Arc<dyn Transport>,
    lifecycle: Mutex<Lifecycle>,
}

impl Output {
    /// Resolves configuration and builds the HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any configuration source is invalid
    /// - The URL is missing or does not parse
    /// - The HTTP client cannot be built (bad header, unreadable CA file)
    pub fn new(params: OutputParams) -> Result<Self, OutputError> {
        let config = Config::resolve(
            params.json_config.as_deref(),
            &params.environment,
            &params.config_argument,
        )?;
        let request = config.request_config()?;
        let sender = HttpSender::new(&request)?;

        tracing::info!(url = %request.url, "Dynatrace output configured");

        Ok(Self::with_transport(config, Arc::new(sender)))
    }

    /// Creates an output delivering through the given transport.
    #[must_use]
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            buffer: Arc::new(ExportBuffer::new()),
            transport,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Human-readable description of this output.
    #[must_use]
    pub fn description(&self) -> &'static str {
        "Output k6 metrics to Dynatrace metrics ingest api"
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The sample buffer, for producers that outlive a borrow of the output.
    #[must_use]
    pub fn buffer(&self) -> Arc<ExportBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Buffers one sample.
    pub fn add_sample(&self, sample: RawSample) {
        self.buffer.add(sample);
    }

    /// Buffers a batch of samples.
    pub fn add_samples(&self, samples: impl IntoIterator<Item = RawSample>) {
        self.buffer.add_all(samples);
    }

    /// Starts periodic flushing on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is already running or has been stopped.
    pub fn start(&self) -> Result<(), OutputError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if lifecycle.stopped {
            return Err(OutputError::Stopped);
        }
        if lifecycle.scheduler.is_some() {
            return Err(OutputError::AlreadyStarted);
        }

        let flusher = Flusher::new(
            Arc::clone(&self.buffer),
            MetricConverter::new(self.config.tag_policy()),
            Arc::clone(&self.transport),
            self.config.flush_period,
        );
        lifecycle.scheduler = Some(Arc::new(FlushScheduler::start(flusher)));

        tracing::info!(flush_period = ?self.config.flush_period, "Starting dynatrace writer");
        Ok(())
    }

    /// Stops periodic flushing.
    ///
    /// Waits for an in-flight flush; samples still buffered afterwards are not
    /// sent. Safe to call more than once, or without a prior `start`.
    pub async fn stop(&self) {
        let scheduler = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            lifecycle.stopped = true;
            lifecycle.scheduler.clone()
        };

        if let Some(scheduler) = scheduler {
            tracing::info!("Stopping dynatrace writer");
            scheduler.stop().await;
        }
    }

    /// State of the flush loop, or `None` if the output was never started.
    #[must_use]
    pub fn state(&self) -> Option<SchedulerState> {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        lifecycle.scheduler.as_ref().map(|scheduler| scheduler.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn deliver(&self, _payload: String) -> Result<DeliveryReport, TransportError> {
            Ok(DeliveryReport {
                status: 202,
                body: String::new(),
            })
        }
    }

    fn params(arg: &str) -> OutputParams {
        OutputParams {
            json_config: None,
            environment: HashMap::new(),
            config_argument: arg.to_string(),
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = Output::new(params("url=https://h/api,flushPeriod=d"));
        assert!(matches!(result, Err(OutputError::Config(_))));
    }

    #[test]
    fn test_new_defers_url_error_to_request_config() {
        let result = Output::new(params("url=not a url"));
        assert!(matches!(
            result,
            Err(OutputError::Request(RequestConfigError::InvalidUrl { .. }))
        ));

        let result = Output::new(params(""));
        assert!(matches!(
            result,
            Err(OutputError::Request(RequestConfigError::MissingUrl))
        ));
    }

    #[test]
    fn test_new_rejects_invalid_header_name() {
        let result = Output::new(params("url=https://h/api,headers.bad header=v"));
        assert!(matches!(
            result,
            Err(OutputError::Client(ClientBuildError::HeaderName(_)))
        ));
    }

    #[test]
    fn test_new_success() {
        let output = assert_ok!(Output::new(params("url=https://h/api,flushPeriod=2s")));
        assert_eq!(output.config().flush_period, std::time::Duration::from_secs(2));
        assert!(output.description().contains("Dynatrace"));
        assert!(output.state().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let output = Output::with_transport(Config::default(), Arc::new(NullTransport));

        assert_ok!(output.start());
        let err = assert_err!(output.start());
        assert!(matches!(err, OutputError::AlreadyStarted));
        assert_eq!(output.state(), Some(SchedulerState::Idle));

        output.stop().await;
        output.stop().await;
        assert_eq!(output.state(), Some(SchedulerState::Stopped));
        let err = assert_err!(output.start());
        assert!(matches!(err, OutputError::Stopped));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let output = Output::with_transport(Config::default(), Arc::new(NullTransport));
        output.stop().await;
        assert!(output.state().is_none());
        let err = assert_err!(output.start());
        assert!(matches!(err, OutputError::Stopped));
    }

    #[test]
    fn test_add_samples_buffers() {
        let output = Output::with_transport(Config::default(), Arc::new(NullTransport));
        output.add_sample(RawSample::new("vus", 1.0));
        output.add_samples(vec![RawSample::new("vus", 2.0), RawSample::new("vus", 3.0)]);
        assert_eq!(output.buffer().len(), 3);
    }
}
