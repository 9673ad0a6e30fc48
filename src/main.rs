//! Uptime Ping - endpoint health monitoring.
//!
//! Probes configured HTTP endpoints on a fixed interval, keeps a day-partitioned
//! history of results, and alerts on status changes.

mod config;
mod db;
mod incident;
mod probe;
mod scheduler;
mod stats;
mod web;

use config::{EndpointRegistry, ServerConfig};
use db::{CheckStore, IncidentStore};
use incident::{LogNotifier, NotificationQueue, Notifier, TelegramNotifier};
use probe::Checker;
use scheduler::{Engine, RetentionManager, Scheduler};
use stats::Aggregator;
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const NOTIFICATION_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("uptime_ping=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Uptime Ping on port {}...", cfg.http_port);
    tracing::info!("Using data directory {}", cfg.data_dir.display());

    let registry = Arc::new(EndpointRegistry::load(&cfg.config_path)?);
    tracing::info!(
        "Loaded {} endpoints from {}",
        registry.snapshot().await.len(),
        registry.path().display()
    );

    // Initialize storage
    let check_store = Arc::new(CheckStore::open(&cfg.data_dir)?);
    let incident_store = Arc::new(IncidentStore::open(&cfg.data_dir)?);

    let notifier: Arc<dyn Notifier> = match cfg.telegram() {
        Some((token, chat_id)) => {
            tracing::info!("Telegram notifications enabled");
            Arc::new(TelegramNotifier::new(token, chat_id))
        }
        None => {
            tracing::warn!("Telegram not configured, incidents will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let notifications = NotificationQueue::spawn(notifier, NOTIFICATION_QUEUE_CAPACITY);

    let engine = Arc::new(Engine::new(
        Checker::new()?,
        check_store.clone(),
        incident_store.clone(),
        notifications,
    ));

    // Start background tasks
    let scheduler = Scheduler::new(engine.clone(), registry.clone(), cfg.check_interval());
    scheduler.start().await;

    let retention = RetentionManager::new(check_store.clone(), incident_store.clone(), cfg.retention_days);
    retention.start().await;

    // Start web server
    let server = Server::new(AppState {
        config: cfg,
        registry,
        engine,
        aggregator: Aggregator::new(check_store.clone()),
        check_store,
        incident_store,
    });
    let served = server.start().await;

    scheduler.stop().await;
    retention.stop().await;
    served
}
