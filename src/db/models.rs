//! Data model types shared by the probe, incident and storage layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A monitored endpoint, as read from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_degraded_threshold_ms")]
    pub degraded_threshold_ms: u64,
}

fn default_expected_status() -> u16 {
    200
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_degraded_threshold_ms() -> u64 {
    3_000
}

impl Endpoint {
    /// Create an endpoint with default expectations for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            expected_status: default_expected_status(),
            timeout_ms: default_timeout_ms(),
            degraded_threshold_ms: default_degraded_threshold_ms(),
        }
    }

    /// Name shown to operators, falling back to the URL.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn degraded_threshold(&self) -> Duration {
        Duration::from_millis(self.degraded_threshold_ms)
    }
}

/// Classified health of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
    Degraded,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
            Status::Degraded => "degraded",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a single probe. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub url: String,
    pub status: Status,
    /// Observed HTTP status, absent on transport failure.
    pub status_code: Option<u16>,
    /// Elapsed time in milliseconds, rounded to 2 decimals.
    pub response_time_ms: f64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// A detected status transition for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub url: String,
    pub prev_status: Status,
    pub new_status: Status,
    pub changed_at: DateTime<Utc>,
    /// Error text of the check that triggered the transition.
    pub error: Option<String>,
    /// Start of the outage, set only when recovering out of `down`.
    pub was_down_since: Option<DateTime<Utc>>,
}

impl IncidentEvent {
    /// Outage length for a recovery event.
    pub fn downtime(&self) -> Option<chrono::Duration> {
        self.was_down_since.map(|since| self.changed_at - since)
    }
}
