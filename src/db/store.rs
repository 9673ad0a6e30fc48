//! Check and incident stores on top of the day-partitioned log.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::path::Path;

use super::partition::{DbError, PartitionedLog, Record};
use super::models::{CheckResult, IncidentEvent};

impl Record for CheckResult {
    fn timestamp(&self) -> DateTime<Utc> {
        self.checked_at
    }
}

impl Record for IncidentEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.changed_at
    }
}

/// Start of an `hours`-long window ending at `now`, clamped to the earliest
/// representable instant.
fn window_start(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    now.checked_sub_signed(ChronoDuration::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Durable log of every check result, under `<data_dir>/checks`.
pub struct CheckStore {
    log: PartitionedLog<CheckResult>,
}

impl CheckStore {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DbError> {
        Ok(Self {
            log: PartitionedLog::open(data_dir.as_ref().join("checks"))?,
        })
    }

    /// Append a batch of results.
    pub fn append(&self, results: &[CheckResult]) -> Result<(), DbError> {
        self.log.append(results)
    }

    /// Checks from the last `hours` hours, most recent first.
    pub fn load_window(&self, hours: u32) -> Result<Vec<CheckResult>, DbError> {
        self.load_window_at(hours, Utc::now())
    }

    /// Checks in `[now - hours, now]`, most recent first.
    pub fn load_window_at(&self, hours: u32, now: DateTime<Utc>) -> Result<Vec<CheckResult>, DbError> {
        self.log.load_range(window_start(now, hours), now)
    }

    /// Drop partitions dated before `cutoff`.
    pub fn prune_before(&self, cutoff: NaiveDate) -> Result<usize, DbError> {
        self.log.remove_before(cutoff)
    }
}

/// Durable log of incident events, under `<data_dir>/incidents`.
pub struct IncidentStore {
    log: PartitionedLog<IncidentEvent>,
}

impl IncidentStore {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DbError> {
        Ok(Self {
            log: PartitionedLog::open(data_dir.as_ref().join("incidents"))?,
        })
    }

    pub fn append(&self, event: &IncidentEvent) -> Result<(), DbError> {
        self.log.append(std::slice::from_ref(event))
    }

    /// Incidents from the last `hours` hours, most recent first.
    pub fn load_window(&self, hours: u32) -> Result<Vec<IncidentEvent>, DbError> {
        self.load_window_at(hours, Utc::now())
    }

    pub fn load_window_at(&self, hours: u32, now: DateTime<Utc>) -> Result<Vec<IncidentEvent>, DbError> {
        self.log.load_range(window_start(now, hours), now)
    }

    pub fn prune_before(&self, cutoff: NaiveDate) -> Result<usize, DbError> {
        self.log.remove_before(cutoff)
    }
}
