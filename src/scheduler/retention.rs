//! Retention manager for cleaning up old day partitions.

use crate::db::{CheckStore, IncidentStore};

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Manager for deleting partitions past the retention period.
pub struct RetentionManager {
    check_store: Arc<CheckStore>,
    incident_store: Arc<IncidentStore>,
    retention_days: u32,
    stop: Arc<Mutex<Option<tokio::sync::broadcast::Sender<()>>>>,
}

impl RetentionManager {
    pub fn new(check_store: Arc<CheckStore>, incident_store: Arc<IncidentStore>, retention_days: u32) -> Self {
        Self {
            check_store,
            incident_store,
            retention_days,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the retention manager background task.
    pub async fn start(&self) {
        let (tx, mut rx) = tokio::sync::broadcast::channel(1);
        *self.stop.lock().await = Some(tx);

        let check_store = self.check_store.clone();
        let incident_store = self.incident_store.clone();
        let retention_days = self.retention_days;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        let cutoff = retention_cutoff(Utc::now().date_naive(), retention_days);
                        process_retention(&check_store, &incident_store, cutoff);
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }
}

/// Oldest day kept when retaining `days` full days before `today`.
///
/// Yesterday is always kept so day-long windows survive midnight.
pub fn retention_cutoff(today: NaiveDate, days: u32) -> NaiveDate {
    today - ChronoDuration::days(i64::from(days.max(1)))
}

/// Delete check and incident partitions older than `cutoff`.
pub fn process_retention(check_store: &CheckStore, incident_store: &IncidentStore, cutoff: NaiveDate) {
    match check_store.prune_before(cutoff) {
        Ok(0) => {}
        Ok(n) => tracing::info!("RetentionManager: Removed {} check partitions before {}", n, cutoff),
        Err(e) => tracing::error!("RetentionManager: Failed to prune checks: {}", e),
    }

    match incident_store.prune_before(cutoff) {
        Ok(0) => {}
        Ok(n) => tracing::info!("RetentionManager: Removed {} incident partitions before {}", n, cutoff),
        Err(e) => tracing::error!("RetentionManager: Failed to prune incidents: {}", e),
    }
}
