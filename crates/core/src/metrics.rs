//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (terminal outcomes, pipeline duration)
//! - Image fetching (cache hits, downloads, busy signals)
//! - Post-processing and compute monitoring

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs reaching a terminal status, by outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mosaic_jobs_finished_total", "Jobs reaching a terminal status"),
        &["outcome"], // "completed", "failed", "killed"
    )
    .unwrap()
});

/// Wall time from job creation to a terminal status.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mosaic_job_duration_seconds",
            "Duration from job creation to a terminal status",
        )
        .buckets(vec![10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Image fetching
// =============================================================================

/// Images resolved by the fetch coordinator, by result.
pub static IMAGE_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mosaic_image_fetches_total", "Images resolved for jobs"),
        &["result"], // "cache_hit", "downloaded", "failed"
    )
    .unwrap()
});

/// Fetch attempts refused because a connection ceiling was reached.
pub static DOWNLOAD_BUSY_SIGNALS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mosaic_download_busy_signals_total",
        "Fetch attempts deferred by the downloader",
    )
    .unwrap()
});

// =============================================================================
// Post-processing and compute
// =============================================================================

/// External stage processes launched.
pub static STAGES_LAUNCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mosaic_stages_launched_total", "Post-process stages launched"),
        &["stage"],
    )
    .unwrap()
});

/// Compute monitor polls, by result.
pub static MONITOR_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mosaic_monitor_ticks_total", "Compute monitor polls"),
        &["result"], // "idle", "pending", "finished", "error"
    )
    .unwrap()
});

/// Get all metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_DURATION.clone()),
        // Fetching
        Box::new(IMAGE_FETCHES.clone()),
        Box::new(DOWNLOAD_BUSY_SIGNALS.clone()),
        // Post-processing and compute
        Box::new(STAGES_LAUNCHED.clone()),
        Box::new(MONITOR_TICKS.clone()),
    ]
}
