//! Concurrent fan-out of probes across all endpoints.

use tokio::task::JoinSet;

use super::{probe_endpoint, ProbeError};
use crate::db::{CheckResult, Endpoint};

/// Runs one probe per endpoint concurrently and collects the batch.
#[derive(Clone)]
pub struct Checker {
    client: reqwest::Client,
}

impl Checker {
    /// Create a checker with its own HTTP client.
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("uptime-ping/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Probe every endpoint concurrently.
    ///
    /// Completes once every probe has returned or timed out. Results come
    /// back in completion order, not endpoint order.
    pub async fn check_all(&self, endpoints: &[Endpoint]) -> Vec<CheckResult> {
        let mut tasks = JoinSet::new();
        for endpoint in endpoints.iter().cloned() {
            let client = self.client.clone();
            tasks.spawn(async move { probe_endpoint(&client, &endpoint).await });
        }

        let mut results = Vec::with_capacity(endpoints.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Probe task failed: {}", e),
            }
        }
        results
    }
}
