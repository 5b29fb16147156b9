//! Standard metrics for Hermes.
//!
//! Recording goes through the `metrics` facade. Nothing is exported from
//! here: the embedding host decides which recorder (if any) is installed.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use hermes_telemetry::metrics::{record_analysis, record_request};
//!
//! record_request("analyze", 200);
//! record_analysis("completed", Duration::from_millis(45));
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Counter of answered requests.
pub const REQUESTS_TOTAL: &str = "hermes_requests_total";

/// Counter of requests refused before dispatch.
pub const REJECTIONS_TOTAL: &str = "hermes_rejections_total";

/// Histogram of dispatched job durations.
pub const ANALYSIS_DURATION_SECONDS: &str = "hermes_analysis_duration_seconds";

/// Gauge of registered jobs.
pub const IN_FLIGHT_ANALYSES: &str = "hermes_in_flight_analyses";

/// Registers descriptions for all standard metrics with the installed
/// recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests answered");
    describe_counter!(
        REJECTIONS_TOTAL,
        "Requests refused by validation or decoding, by reason"
    );
    describe_histogram!(
        ANALYSIS_DURATION_SECONDS,
        "Time between registering an analysis job and resolving it"
    );
    describe_gauge!(IN_FLIGHT_ANALYSES, "Analysis jobs currently registered");
}

/// Records an answered request.
pub fn record_request(route: &'static str, status_code: u16) {
    counter!(
        REQUESTS_TOTAL,
        "route" => route,
        "status" => status_code.to_string()
    )
    .increment(1);
}

/// Records a request refused before it reached the dispatcher.
pub fn record_rejection(reason: &'static str) {
    counter!(REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Records how a dispatched job ended and how long it took.
pub fn record_analysis(outcome: &'static str, duration: Duration) {
    histogram!(ANALYSIS_DURATION_SECONDS, "outcome" => outcome).record(duration.as_secs_f64());
}

/// Guard that keeps the in-flight gauge raised while alive.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_ANALYSES).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_ANALYSES).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_request("analyze", 200);
        record_rejection("unauthorized");
        record_analysis("completed", Duration::from_millis(5));
        let guard = InFlightGuard::new();
        drop(guard);
    }

    #[test]
    fn test_metric_names() {
        assert!(REQUESTS_TOTAL.starts_with("hermes_"));
        assert!(ANALYSIS_DURATION_SECONDS.ends_with("_seconds"));
    }
}
