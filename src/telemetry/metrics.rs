//! Metric instrument factories for taskq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Until a provider is installed the global meter is a no-op, so queues can
//! record unconditionally.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskq")
}

/// Counter: items accepted into a backlog.
/// Labels: `queue`.
pub fn tasks_submitted() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.submitted")
        .with_description("Number of items accepted by a work queue")
        .build()
}

/// Counter: workers that finished.
/// Labels: `queue`, `outcome` ("completed" | "panicked" | "aborted").
pub fn tasks_completed() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.completed")
        .with_description("Number of workers that finished, by outcome")
        .build()
}

/// Counter: submissions refused because the queue was stopping.
/// Labels: `queue`.
pub fn tasks_rejected() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.rejected")
        .with_description("Submissions rejected after a stop request")
        .build()
}

/// Counter: backlog items dropped by a discarding stop.
/// Labels: `queue`.
pub fn tasks_discarded() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.discarded")
        .with_description("Backlog items dropped by a discarding stop")
        .build()
}

/// Histogram: handler run time in milliseconds.
/// Labels: `queue`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskq.task.duration_ms")
        .with_description("Handler run time in milliseconds")
        .with_unit("ms")
        .build()
}

/// Instruments used by one queue's control loop, built once at startup.
pub struct QueueMetrics {
    pub submitted: Counter<u64>,
    pub completed: Counter<u64>,
    pub rejected: Counter<u64>,
    pub discarded: Counter<u64>,
    pub duration_ms: Histogram<f64>,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            submitted: tasks_submitted(),
            completed: tasks_completed(),
            rejected: tasks_rejected(),
            discarded: tasks_discarded(),
            duration_ms: task_duration_ms(),
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}
