//! Client-side metrics
//!
//! Recorded through the `metrics` facade; the host decides whether and where
//! they are exported. With no recorder installed every call is a no-op.
//!
//! - `auth_client_refresh_total` (counter): label `outcome`
//! - `auth_client_refresh_duration_seconds` (histogram)
//! - `auth_client_refresh_waiters` (histogram): callers released per cycle
//! - `auth_client_retries_total` (counter): calls replayed after a refresh
//! - `auth_client_retry_exhausted_total` (counter): replays that still got 401
//! - `auth_client_session_terminations_total` (counter): label `reason`

use std::time::Duration;

use crate::error::RefreshError;
use crate::terminator::TerminationReason;

/// Histogram buckets for `auth_client_refresh_duration_seconds`, in seconds.
pub const REFRESH_DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Record a finished refresh exchange. `error` is `None` on success.
pub fn record_refresh(error: Option<&RefreshError>, duration: Duration) {
    let outcome = error.map_or("success", RefreshError::label);
    metrics::counter!("auth_client_refresh_total", "outcome" => outcome).increment(1);
    metrics::histogram!("auth_client_refresh_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_refresh_waiters(count: usize) {
    metrics::histogram!("auth_client_refresh_waiters").record(count as f64);
}

pub fn record_retry() {
    metrics::counter!("auth_client_retries_total").increment(1);
}

pub fn record_retry_exhausted() {
    metrics::counter!("auth_client_retry_exhausted_total").increment(1);
}

pub fn record_termination(reason: TerminationReason) {
    metrics::counter!("auth_client_session_terminations_total", "reason" => reason.label())
        .increment(1);
}
