//! Scheduler module for running check cycles.
//!
//! [`Engine::run_cycle`] is the single entry point for one sweep: probe all
//! endpoints, persist the results, detect transitions, persist incidents and
//! hand them to the notifier. [`Scheduler`] drives it on a fixed interval.

mod retention;

pub use retention::*;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::config::EndpointRegistry;
use crate::db::{CheckResult, CheckStore, DbError, Endpoint, IncidentEvent, IncidentStore, Status};
use crate::incident::{IncidentTracker, NotificationQueue};
use crate::probe::Checker;

/// Check cycle error types.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to persist check results: {0}")]
    Checks(#[source] DbError),
    #[error("failed to persist incident: {0}")]
    Incidents(#[source] DbError),
}

/// Outcome of one check cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub results: Vec<CheckResult>,
    pub incidents: Vec<IncidentEvent>,
}

impl CycleReport {
    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// The health-check engine.
pub struct Engine {
    checker: Checker,
    check_store: Arc<CheckStore>,
    incident_store: Arc<IncidentStore>,
    notifications: NotificationQueue,
    // Held for a whole cycle, so cycles never overlap.
    tracker: Mutex<IncidentTracker>,
}

impl Engine {
    pub fn new(
        checker: Checker,
        check_store: Arc<CheckStore>,
        incident_store: Arc<IncidentStore>,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            checker,
            check_store,
            incident_store,
            notifications,
            tracker: Mutex::new(IncidentTracker::new()),
        }
    }

    /// Run one check cycle over `endpoints`.
    ///
    /// The whole cycle is processed even if storage fails part way; the
    /// first storage error is returned at the end.
    pub async fn run_cycle(&self, endpoints: &[Endpoint]) -> Result<CycleReport, EngineError> {
        let mut tracker = self.tracker.lock().await;

        if endpoints.is_empty() {
            return Ok(CycleReport::default());
        }

        tracing::info!("Running health checks on {} endpoints", endpoints.len());
        let results = self.checker.check_all(endpoints).await;

        let mut first_error = None;
        if let Err(e) = self.check_store.append(&results) {
            tracing::error!("Failed to persist {} check results: {}", results.len(), e);
            first_error = Some(EngineError::Checks(e));
        }

        let mut incidents = Vec::new();
        for result in &results {
            let Some(event) = tracker.observe(result) else {
                continue;
            };

            tracing::warn!(
                "Incident detected: {} {} -> {}",
                event.url,
                event.prev_status,
                event.new_status
            );

            // Persist before notifying; an unsaved incident is never sent.
            match self.incident_store.append(&event) {
                Ok(()) => {
                    self.notifications.enqueue(event.clone());
                }
                Err(e) => {
                    tracing::error!("Failed to persist incident for {}: {}", event.url, e);
                    first_error.get_or_insert(EngineError::Incidents(e));
                }
            }
            incidents.push(event);
        }

        let report = CycleReport { results, incidents };
        tracing::info!(
            "Check complete: {} up, {} down, {} degraded",
            report.count(Status::Up),
            report.count(Status::Down),
            report.count(Status::Degraded)
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Drives [`Engine::run_cycle`] at a fixed interval.
pub struct Scheduler {
    engine: Arc<Engine>,
    registry: Arc<EndpointRegistry>,
    interval: Duration,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, registry: Arc<EndpointRegistry>, interval: Duration) -> Self {
        Self {
            engine,
            registry,
            interval,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the check loop. The first cycle runs immediately.
    pub async fn start(&self) {
        let (tx, mut rx) = broadcast::channel(1);
        *self.stop.lock().await = Some(tx);

        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let period = self.interval;

        tracing::info!("Scheduler started (interval: {}s)", period.as_secs());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        let endpoints = registry.snapshot().await;
                        if let Err(e) = engine.run_cycle(&endpoints).await {
                            tracing::error!("Check cycle failed: {}", e);
                        }
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        });
    }

    /// Stop the check loop after the current cycle.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
    }
}
