//! Periodic flushing.
//!
//! A [`Flusher`] performs one drain → convert → deliver cycle and owns the
//! backpressure flag derived from how long the previous cycle took. A
//! [`FlushScheduler`] runs a flusher on a fixed period from a single task, so
//! cycles never overlap.

use shared::convert::MetricConverter;
use shared::models::{render_payload, ExportedMetric, RawSample};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::buffer::ExportBuffer;
use crate::sender::{DeliveryReport, Transport, TransportError};

/// Maximum number of samples exported by one cycle while under backpressure.
pub const BACKPRESSURE_SAMPLE_LIMIT: usize = 150_000;

/// Lifecycle of a [`FlushScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A cycle is in progress.
    Flushing,
    /// The loop has exited; no further cycles run.
    Stopped,
}

/// What happened to a cycle's payload.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Nothing was drained, so no request was made.
    Skipped,
    /// The backend answered, whatever the status.
    Delivered(DeliveryReport),
    /// The payload did not reach the backend and was dropped.
    Failed(TransportError),
}

/// Summary of one flush cycle.
#[derive(Debug)]
pub struct FlushCycle {
    /// When the cycle started.
    pub started_at: Instant,
    /// Samples drained from the buffer.
    pub drained: usize,
    /// Samples converted and handed to the transport.
    pub exported: usize,
    /// Samples discarded by the backpressure cap.
    pub dropped: usize,
    /// Wall time the cycle took.
    pub elapsed: Duration,
    /// Delivery outcome.
    pub outcome: DeliveryOutcome,
    /// Backpressure state carried into the next cycle.
    pub backpressure: bool,
}

/// Runs flush cycles against a buffer and a transport.
pub struct Flusher {
    buffer: Arc<ExportBuffer>,
    converter: MetricConverter,
    transport: Arc<dyn Transport>,
    flush_period: Duration,
    backpressure: bool,
}

impl Flusher {
    /// Creates a flusher. Backpressure starts cleared.
    #[must_use]
    pub fn new(
        buffer: Arc<ExportBuffer>,
        converter: MetricConverter,
        transport: Arc<dyn Transport>,
        flush_period: Duration,
    ) -> Self {
        Self {
            buffer,
            converter,
            transport,
            flush_period,
            backpressure: false,
        }
    }

    /// Returns true if the previous cycle overran the flush period.
    #[must_use]
    pub fn backpressure(&self) -> bool {
        self.backpressure
    }

    /// The configured flush period.
    #[must_use]
    pub fn flush_period(&self) -> Duration {
        self.flush_period
    }

    /// Runs one cycle.
    ///
    /// Transport failures are logged and reported in the returned cycle; they
    /// never abort the flusher.
    pub async fn flush(&mut self) -> FlushCycle {
        let started_at = Instant::now();
        let samples = self.buffer.drain_all();
        let drained = samples.len();

        if drained == 0 {
            tracing::debug!("No data to send");
            return self.finish(started_at, 0, 0, DeliveryOutcome::Skipped);
        }

        let metrics = self.convert(samples);
        let exported = metrics.len();
        let dropped = drained - exported;
        if dropped > 0 {
            tracing::warn!(
                samples = exported,
                dropped,
                "Previous flush overran its period, dropping the rest of this backlog"
            );
        }
        tracing::debug!(
            samples = exported,
            "Converted samples in preparation for sending"
        );

        let payload = render_payload(&metrics);
        drop(metrics);

        let outcome = match self.transport.deliver(payload).await {
            Ok(report) => DeliveryOutcome::Delivered(report),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    samples = exported,
                    elapsed = ?started_at.elapsed(),
                    "Failed to send samples"
                );
                DeliveryOutcome::Failed(e)
            }
        };

        self.finish(started_at, drained, exported, outcome)
    }

    fn convert(&self, samples: Vec<RawSample>) -> Vec<ExportedMetric> {
        let limit = if self.backpressure {
            BACKPRESSURE_SAMPLE_LIMIT
        } else {
            usize::MAX
        };

        samples
            .into_iter()
            .take(limit)
            .map(|sample| self.converter.convert(sample))
            .collect()
    }

    fn finish(
        &mut self,
        started_at: Instant,
        drained: usize,
        exported: usize,
        outcome: DeliveryOutcome,
    ) -> FlushCycle {
        let elapsed = started_at.elapsed();

        if elapsed > self.flush_period {
            tracing::warn!(
                samples = exported,
                elapsed = ?elapsed,
                flush_period = ?self.flush_period,
                "Remote write took longer than the flush period, some samples may be dropped"
            );
            self.backpressure = true;
        } else {
            tracing::debug!(samples = exported, elapsed = ?elapsed, "Remote write finished");
            self.backpressure = false;
        }

        FlushCycle {
            started_at,
            drained,
            exported,
            dropped: drained - exported,
            elapsed,
            outcome,
            backpressure: self.backpressure,
        }
    }
}

/// Drives a [`Flusher`] on a fixed period.
///
/// The first cycle runs one period after [`FlushScheduler::start`]. A tick
/// that arrives while a cycle is still running is skipped.
pub struct FlushScheduler {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SchedulerState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// Spawns the flush loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn start(mut flusher: Flusher) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let period = flusher.flush_period;

        let handle = tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = tick.tick() => {
                        state_tx.send_replace(SchedulerState::Flushing);
                        flusher.flush().await;
                        state_tx.send_replace(SchedulerState::Idle);
                    }
                }
            }

            state_tx.send_replace(SchedulerState::Stopped);
        });

        tracing::debug!(flush_period = ?period, "Flush scheduler started");

        Self {
            stop_tx,
            state_rx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Current state of the loop.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Stops the loop.
    ///
    /// Waits for an in-flight cycle to finish; no cycle runs after this
    /// returns. Calling it again is a no-op that also waits for the first
    /// call to complete.
    pub async fn stop(&self) {
        let mut handle = self.handle.lock().await;
        let Some(task) = handle.take() else {
            return;
        };

        // The loop may already be gone if the runtime is shutting down.
        let _ = self.stop_tx.send(true);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Flush task terminated abnormally");
        }
        tracing::debug!("Flush scheduler stopped");
    }
}
