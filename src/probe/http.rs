//! HTTP probe implementation.

use chrono::Utc;
use std::time::{Duration, Instant};

use super::{classify, ProbeError};
use crate::db::{CheckResult, Endpoint};

/// Run a single HTTP GET against `url`.
///
/// Returns the response status code once the body has been read in full.
pub async fn run_http_probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<u16, ProbeError> {
    let to_probe_error = |e: reqwest::Error| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(e.to_string())
        }
    };

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(to_probe_error)?;

    let status = response.status().as_u16();

    // Read the full body to measure complete transfer time
    let _body = response.bytes().await.map_err(to_probe_error)?;

    Ok(status)
}

/// Probe one endpoint and classify the outcome. Never fails.
pub async fn probe_endpoint(client: &reqwest::Client, endpoint: &Endpoint) -> CheckResult {
    let start = Instant::now();
    let outcome = run_http_probe(client, &endpoint.url, endpoint.timeout()).await;
    let elapsed = start.elapsed();

    let result = classify(endpoint, outcome, elapsed, Utc::now());
    tracing::debug!(
        endpoint = endpoint.display_name(),
        url = %result.url,
        status = %result.status,
        response_time_ms = result.response_time_ms,
        "Probe complete"
    );
    result
}
