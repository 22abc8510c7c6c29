//! Sample buffer shared between producers and the flush loop.

use shared::models::RawSample;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Accumulates samples between two flushes.
///
/// `add` and `drain_all` take the same lock, so every sample is returned by
/// exactly one drain. The buffer itself is unbounded; the flush loop caps how
/// much of a backlog is exported per cycle.
#[derive(Debug, Default)]
pub struct ExportBuffer {
    samples: Mutex<Vec<RawSample>>,
}

impl ExportBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one sample.
    pub fn add(&self, sample: RawSample) {
        self.lock().push(sample);
    }

    /// Appends a batch of samples under a single lock acquisition.
    pub fn add_all(&self, samples: impl IntoIterator<Item = RawSample>) {
        self.lock().extend(samples);
    }

    /// Removes and returns everything buffered since the previous drain, in
    /// insertion order.
    pub fn drain_all(&self) -> Vec<RawSample> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking producer must not stop everyone else from buffering.
    fn lock(&self) -> MutexGuard<'_, Vec<RawSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
