//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the mosaic server:
//! - HTTP request metrics (latency, counts)
//! - Job counts by status and workflow state (collected dynamically)
//! - Core pipeline metrics registered from `mosaic_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use mosaic_core::{JobId, JobStatus};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mosaic_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mosaic_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mosaic_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Job Metrics (collected dynamically)
// =============================================================================

/// Jobs by current status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("mosaic_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Workflow lane occupancy (1 = a job is between catalog query and submission).
pub static WORKFLOW_LANE_BUSY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mosaic_workflow_lane_busy",
        "Whether the workflow lane is processing a job",
    )
    .unwrap()
});

/// Image URLs accepted but not yet resolved.
pub static FETCH_OUTSTANDING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mosaic_fetch_outstanding",
        "Image URLs waiting for cache hit, download or failure",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register(registry: &Registry, collector: Box<dyn Collector>) {
    if let Err(e) = registry.register(collector) {
        warn!("Failed to register metric: {}", e);
    }
}

fn register_metrics(registry: &Registry) {
    // HTTP
    register(registry, Box::new(HTTP_REQUEST_DURATION.clone()));
    register(registry, Box::new(HTTP_REQUESTS_TOTAL.clone()));
    register(registry, Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()));

    // Jobs and workflow
    register(registry, Box::new(JOBS_BY_STATUS.clone()));
    register(registry, Box::new(WORKFLOW_LANE_BUSY.clone()));
    register(registry, Box::new(FETCH_OUTSTANDING.clone()));

    // Core metrics (jobs, fetching, post-processing, monitor)
    for metric in mosaic_core::metrics::all_metrics() {
        register(registry, metric);
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values
/// from the job store and the workflow coordinator.
pub fn collect_dynamic_metrics(state: &AppState) {
    let status = state.workflow_status();
    WORKFLOW_LANE_BUSY.set(i64::from(status.lane_busy));
    FETCH_OUTSTANDING.set(status.fetch.outstanding as i64);

    for job_status in [
        JobStatus::QueryingCatalog,
        JobStatus::RunningCompute,
        JobStatus::RunningPostProcess,
        JobStatus::Failed,
        JobStatus::Completed,
        JobStatus::Killed,
    ] {
        if let Ok(jobs) = state.job_store().find_by_status(&[job_status]) {
            JOBS_BY_STATUS
                .with_label_values(&[job_status.as_str()])
                .set(jobs.len() as i64);
        }
    }
}

/// Normalize a path for metric labels (replace job ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<JobId>().is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_job_id() {
        let path = "/api/v1/status/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/status/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_normalize_path_keeps_malformed_ids() {
        let path = "/api/v1/status/not-a-job";
        assert_eq!(normalize_path(path), "/api/v1/status/not-a-job");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        // Access metrics to ensure they're initialized
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("mosaic_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs metrics that have been accessed
        mosaic_core::metrics::IMAGE_FETCHES
            .with_label_values(&["cache_hit"])
            .inc_by(0);
        mosaic_core::metrics::JOBS_FINISHED
            .with_label_values(&["completed"])
            .inc_by(0);
        JOBS_BY_STATUS.with_label_values(&["failed"]).set(0);
        WORKFLOW_LANE_BUSY.set(0);

        let output = encode_metrics().unwrap();
        assert!(output.contains("mosaic_image_fetches_total"));
        assert!(output.contains("mosaic_jobs_finished_total"));
        assert!(output.contains("mosaic_jobs_by_status"));
        assert!(output.contains("mosaic_workflow_lane_busy"));
    }
}
