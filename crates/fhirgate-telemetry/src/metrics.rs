//! Prometheus metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `fhirgate_requests_total` | Counter | `status` |
//! | `fhirgate_request_duration_seconds` | Histogram | - |
//! | `fhirgate_resource_gate_rejections_total` | Counter | - |
//! | `fhirgate_auth_rejections_total` | Counter | `code` |
//! | `fhirgate_notifications_total` | Counter | `outcome` |
//!
//! The recorder is installed without an HTTP listener; the sidecar renders
//! the handle on its own internal endpoint.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder.
///
/// Calling this more than once is a no-op once a handle is stored.
pub fn install_recorder() -> TelemetryResult<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if no recorder is installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        "fhirgate_requests_total",
        "Total number of requests answered by the gate"
    );
    describe_histogram!(
        "fhirgate_request_duration_seconds",
        "Request duration in seconds"
    );
    describe_counter!(
        "fhirgate_resource_gate_rejections_total",
        "Requests rejected for targeting an unexposed resource type"
    );
    describe_counter!(
        "fhirgate_auth_rejections_total",
        "Requests rejected by the auth gate, by status code"
    );
    describe_counter!(
        "fhirgate_notifications_total",
        "Outbound notification attempts by outcome"
    );
}

/// Records a completed request.
pub fn record_request(status_code: u16, duration: Duration) {
    counter!("fhirgate_requests_total", "status" => status_code.to_string()).increment(1);
    histogram!("fhirgate_request_duration_seconds").record(duration.as_secs_f64());
}

/// Records a resource gate rejection.
pub fn record_resource_gate_rejection() {
    counter!("fhirgate_resource_gate_rejections_total").increment(1);
}

/// Records an auth gate rejection with its status code.
pub fn record_auth_rejection(status_code: u16) {
    counter!("fhirgate_auth_rejections_total", "code" => status_code.to_string()).increment(1);
}

/// Records a notification attempt.
///
/// `outcome` is `sent`, `skipped` or a failure class such as `backend`.
pub fn record_notification(outcome: &'static str) {
    counter!("fhirgate_notifications_total", "outcome" => outcome).increment(1);
}
