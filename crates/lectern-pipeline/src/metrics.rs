//! Pipeline metrics.

use std::time::Duration;

pub const RUNS_STARTED_TOTAL: &str = "lectern_pipeline_runs_started_total";
pub const RUNS_COMPLETED_TOTAL: &str = "lectern_pipeline_runs_completed_total";
pub const RUNS_FAILED_TOTAL: &str = "lectern_pipeline_runs_failed_total";
pub const RUN_DURATION_SECONDS: &str = "lectern_pipeline_run_duration_seconds";
pub const CACHE_HITS_TOTAL: &str = "lectern_pipeline_analysis_cache_hits_total";
pub const INFERENCE_LATENCY_SECONDS: &str = "lectern_pipeline_inference_latency_seconds";
pub const TIMING_VIOLATIONS_TOTAL: &str = "lectern_pipeline_timing_violations_total";

pub fn record_run_started(operation: &'static str) {
    metrics::counter!(RUNS_STARTED_TOTAL, "operation" => operation).increment(1);
}

pub fn record_run_completed(operation: &'static str, elapsed: Duration) {
    metrics::counter!(RUNS_COMPLETED_TOTAL, "operation" => operation).increment(1);
    metrics::histogram!(RUN_DURATION_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}

pub fn record_run_failed(operation: &'static str) {
    metrics::counter!(RUNS_FAILED_TOTAL, "operation" => operation).increment(1);
}

pub fn record_cache_hit() {
    metrics::counter!(CACHE_HITS_TOTAL).increment(1);
}

pub fn record_inference(kind: &'static str, model: &str, elapsed: Duration) {
    metrics::histogram!(
        INFERENCE_LATENCY_SECONDS,
        "kind" => kind,
        "model" => model.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_timing_violations(count: usize) {
    if count > 0 {
        metrics::counter!(TIMING_VIOLATIONS_TOTAL).increment(count as u64);
    }
}
