// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the contact form service.
//
// METRIC TYPES USED:
// - Counter: Only goes up (requests, submissions). Resets on restart.
// - Histogram: Distribution of values in buckets (latency percentiles).
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// METRIC NAMES (Constants)
// =============================================================================

/// HTTP request counter
/// Labels: method (GET/POST), endpoint (/), status (200/302)
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// HTTP request duration histogram
/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Form submissions by outcome
/// Labels: outcome (stored/invalid/failed/csrf_rejected)
pub const CONTACT_SUBMISSIONS_TOTAL: &str = "contact_submissions_total";

/// Database query duration histogram
/// Labels: operation (insert)
pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

// =============================================================================
// SUBMISSION OUTCOMES
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Stored,
    Invalid,
    Failed,
    CsrfRejected,
}

impl SubmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionOutcome::Stored => "stored",
            SubmissionOutcome::Invalid => "invalid",
            SubmissionOutcome::Failed => "failed",
            SubmissionOutcome::CsrfRejected => "csrf_rejected",
        }
    }
}

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Install the Prometheus recorder globally and return its render handle.
///
/// Must be called once per process; a second install fails.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    // 1ms .. 10s, suitable for a page render or a single INSERT
    let latency_buckets = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(DB_QUERY_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );

    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        CONTACT_SUBMISSIONS_TOTAL,
        "Contact form submissions by outcome"
    );

    describe_histogram!(
        DB_QUERY_DURATION_SECONDS,
        "Database query latency in seconds"
    );

    Ok(handle)
}

/// A handle that is not installed as the global recorder, for tests.
#[cfg(test)]
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Record an HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

/// Count one form submission
pub fn record_submission(outcome: SubmissionOutcome) {
    counter!(CONTACT_SUBMISSIONS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

/// Record database query duration
pub fn record_db_query(operation: &str, duration_secs: f64) {
    histogram!(
        DB_QUERY_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}
