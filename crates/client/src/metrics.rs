//! Gateway request metrics.
//!
//! No exporter is installed here; the embedding application decides where
//! metrics go.

use metrics::{counter, histogram};
use std::time::Instant;

/// Record gateway request duration.
pub fn record_request_duration(endpoint: &'static str, duration_secs: f64) {
    histogram!("gateway_request_duration_seconds", "endpoint" => endpoint).record(duration_secs);
}

/// Count a failed gateway request.
pub fn record_request_failure(endpoint: &'static str) {
    counter!("gateway_request_failures_total", "endpoint" => endpoint).increment(1);
}

/// Times one gateway request.
///
/// Usage:
/// ```ignore
/// let timer = RequestTimer::new("list_unread");
/// let result = self.send(request).await;
/// timer.finish(result.is_ok());
/// ```
pub struct RequestTimer {
    endpoint: &'static str,
    start: Instant,
}

impl RequestTimer {
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration, and a failure if `ok` is false.
    pub fn finish(self, ok: bool) {
        record_request_duration(self.endpoint, self.start.elapsed().as_secs_f64());
        if !ok {
            record_request_failure(self.endpoint);
        }
    }
}
