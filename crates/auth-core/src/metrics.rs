//! Authentication metrics.
//!
//! Recorded through the `metrics` facade; the hosting service decides whether
//! a recorder (e.g. Prometheus) is installed. Without one these are no-ops.
//!
//! Labels are bounded:
//! - `status`: `success`, `error`
//! - `outcome`: one value per verification result variant

use metrics::{counter, histogram};
use std::time::Duration;

/// Record one JWKS fetch.
///
/// Metrics: `auth_jwks_refresh_total`, `auth_jwks_refresh_duration_seconds`
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("auth_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("auth_jwks_refresh_total", "status" => status).increment(1);
}

/// Record the outcome of one token verification.
///
/// Metric: `auth_token_verifications_total`
pub fn record_token_verification(outcome: &'static str) {
    counter!("auth_token_verifications_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_jwks_refresh("success", Duration::from_millis(12));
        record_token_verification("valid");
    }
}
