//! Probe module for endpoint health checks.
//!
//! A probe is one timed HTTP GET, classified as up, degraded or down.
//! The [`Checker`] fans probes out across every configured endpoint.

mod checker;
mod http;

pub use checker::*;
pub use http::*;

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::db::{CheckResult, Endpoint, Status};

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
}

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Classify a probe outcome into a [`CheckResult`].
///
/// Rules, first match wins: timeout, other transport failure, unexpected
/// status code (all `down`); then latency above the degraded threshold
/// (`degraded`); otherwise `up`.
pub fn classify(
    endpoint: &Endpoint,
    outcome: Result<u16, ProbeError>,
    elapsed: Duration,
    checked_at: DateTime<Utc>,
) -> CheckResult {
    let (status, status_code, error) = match outcome {
        Err(ProbeError::Timeout(_)) => (Status::Down, None, Some("Timeout".to_string())),
        Err(ProbeError::Network(msg)) => (Status::Down, None, Some(msg)),
        Ok(code) if code != endpoint.expected_status => (
            Status::Down,
            Some(code),
            Some(format!("Expected {}, got {}", endpoint.expected_status, code)),
        ),
        Ok(code) if elapsed > endpoint.degraded_threshold() => (Status::Degraded, Some(code), None),
        Ok(code) => (Status::Up, Some(code), None),
    };

    CheckResult {
        url: endpoint.url.clone(),
        status,
        status_code,
        response_time_ms: round2(elapsed.as_secs_f64() * 1000.0),
        error,
        checked_at,
    }
}
