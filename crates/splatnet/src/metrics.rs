//! Metric names and recording helpers
//!
//! - `splatnet_refresh_total` (counter): label `outcome`
//! - `splatnet_requests_total` (counter): labels `operation`, `shared`
//! - `splatnet_auth_retries_total` (counter)
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

/// Record a finished refresh cycle. Only the cycle leader records.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("splatnet_refresh_total", "outcome" => outcome).increment(1);
}

/// Record one caller's request; `shared` is true when it joined another
/// caller's in-flight cycle instead of making its own network call.
pub fn record_request(operation: &str, shared: bool) {
    let shared = if shared { "true" } else { "false" };
    metrics::counter!("splatnet_requests_total", "operation" => operation.to_string(), "shared" => shared)
        .increment(1);
}

/// Record a request retried after a 401 and a successful refresh.
pub fn record_auth_retry() {
    metrics::counter!("splatnet_auth_retries_total").increment(1);
}
