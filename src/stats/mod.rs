//! Uptime and status aggregation over the check log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::db::{CheckResult, CheckStore, DbError, Status};
use crate::probe::round2;

/// Window used for the current-status summary.
pub const SUMMARY_WINDOW_HOURS: u32 = 1;

/// Latest observation of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSummary {
    pub url: String,
    pub status: Status,
    pub response_time_ms: f64,
    pub last_check: DateTime<Utc>,
}

/// Current status across every endpoint seen in the summary window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSummary {
    pub endpoints: Vec<EndpointSummary>,
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub degraded: usize,
    /// Configured URLs with no check inside the summary window.
    pub stale: Vec<String>,
}

/// Uptime statistics for one endpoint over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UptimeReport {
    pub url: String,
    /// `None` when the window holds no checks for the URL.
    pub uptime_pct: Option<f64>,
    pub check_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<CheckResult>,
}

/// Build a status summary from windowed checks.
///
/// Only the most recent check per URL counts. URLs in `configured` that
/// have no check at all are listed as stale instead of being counted.
pub fn summarize(checks: &[CheckResult], configured: &[String]) -> StatusSummary {
    let mut latest: BTreeMap<&str, &CheckResult> = BTreeMap::new();
    for check in checks {
        latest
            .entry(check.url.as_str())
            .and_modify(|current| {
                if check.checked_at > current.checked_at {
                    *current = check;
                }
            })
            .or_insert(check);
    }

    let mut summary = StatusSummary::default();
    for check in latest.values() {
        match check.status {
            Status::Up => summary.up += 1,
            Status::Down => summary.down += 1,
            Status::Degraded => summary.degraded += 1,
        }
        summary.endpoints.push(EndpointSummary {
            url: check.url.clone(),
            status: check.status,
            response_time_ms: check.response_time_ms,
            last_check: check.checked_at,
        });
    }
    summary.total = summary.endpoints.len();

    let mut seen = HashSet::new();
    summary.stale = configured
        .iter()
        .filter(|url| !latest.contains_key(url.as_str()) && seen.insert(url.as_str()))
        .cloned()
        .collect();

    summary
}

/// Compute uptime for `url` from windowed checks sorted most recent first.
///
/// Only `up` counts toward uptime; the latency average covers every check,
/// including timeouts.
pub fn compute_uptime(url: &str, checks: &[CheckResult]) -> UptimeReport {
    let matching: Vec<&CheckResult> = checks.iter().filter(|c| c.url == url).collect();

    if matching.is_empty() {
        return UptimeReport {
            url: url.to_string(),
            uptime_pct: None,
            check_count: 0,
            avg_response_ms: None,
            last_check: None,
        };
    }

    let total = matching.len();
    let up = matching.iter().filter(|c| c.status == Status::Up).count();
    let latency_sum: f64 = matching.iter().map(|c| c.response_time_ms).sum();
    let last_check = matching.iter().max_by_key(|c| c.checked_at).map(|c| (*c).clone());

    UptimeReport {
        url: url.to_string(),
        uptime_pct: Some(round2(up as f64 / total as f64 * 100.0)),
        check_count: total,
        avg_response_ms: Some(round2(latency_sum / total as f64)),
        last_check,
    }
}

/// Query front end over the check store.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<CheckStore>,
}

impl Aggregator {
    pub fn new(store: Arc<CheckStore>) -> Self {
        Self { store }
    }

    /// Latest status per URL seen in the last hour.
    pub fn status_summary(&self) -> Result<StatusSummary, DbError> {
        self.status_summary_with(&[])
    }

    /// Like [`status_summary`](Self::status_summary), also flagging
    /// configured URLs that have gone quiet.
    pub fn status_summary_with(&self, configured: &[String]) -> Result<StatusSummary, DbError> {
        let checks = self.store.load_window(SUMMARY_WINDOW_HOURS)?;
        Ok(summarize(&checks, configured))
    }

    /// Uptime of `url` over the last `hours` hours.
    pub fn uptime(&self, url: &str, hours: u32) -> Result<UptimeReport, DbError> {
        let checks = self.store.load_window(hours)?;
        Ok(compute_uptime(url, &checks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn check(url: &str, status: Status, ms: f64, minutes_ago: i64) -> CheckResult {
        CheckResult {
            url: url.to_string(),
            status,
            status_code: (status != Status::Down).then_some(200),
            response_time_ms: ms,
            error: (status == Status::Down).then(|| "Timeout".to_string()),
            checked_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_summary_uses_latest_per_url() {
        let checks = vec![
            check("a", Status::Down, 10.0, 30),
            check("a", Status::Up, 20.0, 1),
            check("b", Status::Degraded, 4000.0, 2),
            check("c", Status::Down, 10000.0, 5),
        ];

        let summary = summarize(&checks, &[]);
        assert_eq!(summary.total, 3);
        assert_eq!((summary.up, summary.down, summary.degraded), (1, 1, 1));

        let a = summary.endpoints.iter().find(|e| e.url == "a").unwrap();
        assert_eq!(a.status, Status::Up);
        assert_eq!(a.response_time_ms, 20.0);
        assert!(summary.stale.is_empty());
    }

    #[test]
    fn test_summary_reports_stale_configured_urls() {
        let checks = vec![check("a", Status::Up, 20.0, 1)];
        let configured = vec!["a".to_string(), "z".to_string()];

        let summary = summarize(&checks, &configured);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.stale, vec!["z".to_string()]);
    }

    #[test]
    fn test_uptime_no_data() {
        let report = compute_uptime("nope", &[check("a", Status::Up, 1.0, 1)]);
        assert_eq!(report.uptime_pct, None);
        assert_eq!(report.check_count, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["uptime_pct"].is_null());
        assert_eq!(json["check_count"], 0);
        assert!(json.get("avg_response_ms").is_none());
    }

    #[test]
    fn test_uptime_excludes_degraded_and_averages_all() {
        let checks = vec![
            check("a", Status::Up, 100.0, 1),
            check("a", Status::Degraded, 4000.0, 2),
            check("a", Status::Down, 10000.0, 3),
            check("b", Status::Up, 5.0, 1),
        ];

        let report = compute_uptime("a", &checks);
        assert_eq!(report.check_count, 3);
        assert_eq!(report.uptime_pct, Some(33.33));
        assert_eq!(report.avg_response_ms, Some(4700.0));
        assert_eq!(report.last_check.unwrap().status, Status::Up);
    }

    #[test]
    fn test_aggregator_reads_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(CheckStore::open(tmp.path()).unwrap());
        store
            .append(&[
                check("a", Status::Up, 50.0, 90),
                check("a", Status::Up, 50.0, 10),
                check("a", Status::Down, 150.0, 5),
            ])
            .unwrap();

        let aggregator = Aggregator::new(store);

        let summary = aggregator.status_summary().unwrap();
        assert_eq!(summary.down, 1);
        assert_eq!(summary.endpoints[0].response_time_ms, 150.0);

        let hour = aggregator.uptime("a", 1).unwrap();
        assert_eq!(hour.check_count, 2);
        assert_eq!(hour.uptime_pct, Some(50.0));
        assert_eq!(hour.avg_response_ms, Some(100.0));

        let day = aggregator.uptime("a", 24).unwrap();
        assert_eq!(day.check_count, 3);
        assert_eq!(day.uptime_pct, Some(66.67));
    }
}
