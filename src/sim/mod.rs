//! Latency simulations driven through work queues.
//!
//! [`queue`] spreads tasks over several [`WorkQueue`](crate::WorkQueue)s,
//! optionally as tied requests. [`hedged`] races a slow request against
//! hedge attempts launched after a timeout. Both draw latencies from a
//! [`LatencyProfile`] and collect results in a [`LatencyRecorder`] that each
//! run owns.

pub mod hedged;
pub mod queue;

use rand::Rng;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Two-point latency distribution: usually `low`, `high` with probability
/// `high_rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyProfile {
    pub low: Duration,
    pub high: Duration,
    pub high_rate: f64,
}

impl LatencyProfile {
    /// Sample a latency.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let r: f64 = rng.r#gen();
        if r < self.high_rate {
            self.high
        } else {
            self.low
        }
    }

    /// Sample with the thread-local generator.
    pub fn sample_random(&self) -> Duration {
        self.sample(&mut rand::thread_rng())
    }
}

/// Shared per-task latency collector.
///
/// Cloning shares the underlying map. Only the first latency recorded for a
/// task is kept, which is what tied requests need.
#[derive(Debug, Clone, Default)]
pub struct LatencyRecorder {
    samples: Arc<Mutex<HashMap<u64, Duration>>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `latency` for `task` unless the task already has a sample.
    /// Returns whether this call recorded it.
    pub fn record_first(&self, task: u64, latency: Duration) -> bool {
        match self.lock().entry(task) {
            Entry::Vacant(slot) => {
                slot.insert(latency);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn contains(&self, task: u64) -> bool {
        self.lock().contains_key(&task)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Mean of the recorded latencies in milliseconds, `None` when empty.
    pub fn average_ms(&self) -> Option<f64> {
        let samples = self.lock();
        if samples.is_empty() {
            return None;
        }
        let total: f64 = samples.values().map(|d| d.as_secs_f64() * 1000.0).sum();
        Some(total / samples.len() as f64)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Duration>> {
        // A panicking writer cannot leave the map half-updated.
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
