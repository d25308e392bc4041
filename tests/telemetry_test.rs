//! Integration tests for telemetry initialization and span helpers.

use taskq::model::{QueueId, TaskId};
use taskq::telemetry::metrics::QueueMetrics;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    let config = taskq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "taskq-test".to_string(),
        log_level: "debug".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    if let Ok(guard) = taskq::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn task_span_creates_and_records_transition() {
    let span = taskq::telemetry::task::start_task_span("test", &QueueId::new(), TaskId(7));
    taskq::telemetry::task::record_state_transition(&span, "queued", "running");
    taskq::telemetry::task::record_state_transition(&span, "running", "completed");
}

#[test]
fn queue_metrics_record_without_provider() {
    let metrics = QueueMetrics::new();
    let labels = [opentelemetry::KeyValue::new("queue", "test")];
    metrics.submitted.add(1, &labels);
    metrics.duration_ms.record(12.5, &labels);
}
