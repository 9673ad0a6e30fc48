//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::{EndpointRegistry, ServerConfig};
use crate::db::{CheckStore, IncidentStore};
use crate::scheduler::Engine;
use crate::stats::Aggregator;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<EndpointRegistry>,
    pub engine: Arc<Engine>,
    pub aggregator: Aggregator,
    pub check_store: Arc<CheckStore>,
    pub incident_store: Arc<IncidentStore>,
}

/// Query API server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        router(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/", get(handlers::handle_index))
        .route("/health", get(handlers::handle_health))
        .route("/status", get(handlers::handle_status))
        .route("/uptime/{*url}", get(handlers::handle_uptime))
        .route("/checks", get(handlers::handle_checks))
        .route("/incidents", get(handlers::handle_incidents))
        .route("/config", get(handlers::handle_get_config))
        .route("/config/reload", post(handlers::handle_reload_config))
        .route(
            "/config/endpoints",
            post(handlers::handle_add_endpoint).delete(handlers::handle_remove_endpoint),
        )
        .route("/check", post(handlers::handle_trigger_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}
