//! Task execution span helpers.
//!
//! Every admitted item runs inside a `task.execute` span. The control loop
//! records the item's transitions (`queued -> running -> completed|failed`)
//! on it.

use crate::model::{QueueId, TaskId};
use tracing::Span;

/// Start a span for one task.
///
/// The `task.state` field is declared empty and is filled by
/// [`record_state_transition`].
pub fn start_task_span(queue: &str, queue_id: &QueueId, task: TaskId) -> Span {
    tracing::info_span!(
        "task.execute",
        "queue.name" = queue,
        "queue.id" = %queue_id,
        "task.id" = task.0,
        "task.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the task span and emit it as an event.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("task.state", to);
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
