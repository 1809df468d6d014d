//! Prometheus metrics for the frame pipeline.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_TOTAL: &str = "aural_frames_total";
    pub const FRAMES_SKIPPED_TOTAL: &str = "aural_frames_skipped_total";
    pub const INFERENCE_RUNS_TOTAL: &str = "aural_inference_runs_total";
    pub const INFERENCE_DURATION_SECONDS: &str = "aural_inference_duration_seconds";
    pub const RESULTS_EMITTED_TOTAL: &str = "aural_results_emitted_total";
    pub const RESULTS_DROPPED_TOTAL: &str = "aural_results_dropped_total";
}

/// Record a frame passing through the pipeline.
pub fn record_frame() {
    counter!(names::FRAMES_TOTAL).increment(1);
}

/// Record a frame forwarded without inference (`interval` or `busy`).
pub fn record_frame_skipped(reason: &'static str) {
    counter!(names::FRAMES_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

/// Record a finished inference run (`ready`, `failed`, `panicked`, `timed_out`).
pub fn record_inference(outcome: &'static str, duration_secs: f64) {
    counter!(names::INFERENCE_RUNS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::INFERENCE_DURATION_SECONDS).record(duration_secs);
}

pub fn record_result_emitted(delivered: bool) {
    if delivered {
        counter!(names::RESULTS_EMITTED_TOTAL).increment(1);
    } else {
        counter!(names::RESULTS_DROPPED_TOTAL).increment(1);
    }
}
