//! Capture metrics
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed. [`install_prometheus`] installs the Prometheus
//! recorder whose rendered output backs the `/metrics` endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

pub const CAPTURES_TOTAL: &str = "screenshot_captures_total";
pub const CAPTURE_FAILURES_TOTAL: &str = "screenshot_capture_failures_total";
pub const REJECTIONS_TOTAL: &str = "screenshot_rejections_total";
pub const CAPTURE_DURATION_SECONDS: &str = "screenshot_capture_duration_seconds";
pub const CAPTURE_BYTES: &str = "screenshot_capture_bytes";
pub const ACTIVE_PAGES: &str = "screenshot_active_pages";
pub const QUEUED_REQUESTS: &str = "screenshot_queued_requests";

/// A capture that produced an image.
pub fn record_capture(format: &'static str, duration: Duration, bytes: usize) {
    ::metrics::increment_counter!(CAPTURES_TOTAL, "format" => format);
    ::metrics::histogram!(CAPTURE_DURATION_SECONDS, duration.as_secs_f64(), "format" => format);
    ::metrics::histogram!(CAPTURE_BYTES, bytes as f64, "format" => format);
}

/// A capture that failed after browser work started.
pub fn record_failure(kind: &'static str, duration: Duration) {
    ::metrics::increment_counter!(CAPTURE_FAILURES_TOTAL, "kind" => kind);
    ::metrics::histogram!(CAPTURE_DURATION_SECONDS, duration.as_secs_f64(), "format" => "none");
}

/// A request refused by validation or a security gate.
pub fn record_rejection(kind: &'static str) {
    ::metrics::increment_counter!(REJECTIONS_TOTAL, "kind" => kind);
}

pub fn set_pool_usage(active: usize, waiting: usize) {
    ::metrics::gauge!(ACTIVE_PAGES, active as f64);
    ::metrics::gauge!(QUEUED_REQUESTS, waiting as f64);
}

/// Installs the global Prometheus recorder.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("Prometheus metrics recorder installed");
    Ok(handle)
}
