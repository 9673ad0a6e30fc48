//! HTTP request handlers.

use super::AppState;
use crate::config::ConfigError;
use crate::db::Endpoint;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

fn default_hours() -> u32 {
    24
}

fn default_limit() -> usize {
    100
}

// ============================================================================
// Service
// ============================================================================

pub async fn handle_index(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.registry.snapshot().await;
    Json(json!({
        "name": "Uptime Ping",
        "endpoints_monitored": endpoints.len(),
        "check_interval_seconds": state.config.check_interval_secs,
        "api": {
            "/status": "Current status of all endpoints",
            "/uptime/{url}": "Uptime stats for one endpoint",
            "/checks": "Recent check history",
            "/incidents": "Recent status changes",
            "/config": "Current configuration",
            "/config/reload": "Re-read the endpoint config file (POST)",
            "/check": "Trigger an immediate check (POST)",
        }
    }))
}

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ============================================================================
// Status & history
// ============================================================================

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    let configured = state.registry.urls().await;
    match state.aggregator.status_summary_with(&configured) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UptimeQuery {
    #[serde(default = "default_hours")]
    pub hours: u32,
}

pub async fn handle_uptime(
    State(state): State<AppState>,
    Path(url): Path<String>,
    Query(query): Query<UptimeQuery>,
) -> impl IntoResponse {
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url
    } else {
        format!("https://{}", url)
    };

    match state.aggregator.uptime(&url, query.hours) {
        Ok(report) => Json(report).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_hours")]
    pub hours: u32,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub async fn handle_checks(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.check_store.load_window(query.hours) {
        Ok(mut checks) => {
            checks.truncate(query.limit);
            let count = checks.len();
            Json(json!({ "checks": checks, "count": count })).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_incidents(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.incident_store.load_window(query.hours) {
        Ok(mut incidents) => {
            incidents.truncate(query.limit);
            let count = incidents.len();
            Json(json!({ "incidents": incidents, "count": count })).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_trigger_check(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.registry.snapshot().await;
    if let Err(e) = state.engine.run_cycle(&endpoints).await {
        tracing::error!("On-demand check cycle failed: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    let configured = state.registry.urls().await;
    match state.aggregator.status_summary_with(&configured) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.registry.snapshot().await;
    Json(json!({
        "endpoints": endpoints,
        "check_interval_seconds": state.config.check_interval_secs,
    }))
}

pub async fn handle_reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.reload().await {
        Ok(count) => Json(json!({ "success": true, "endpoints_count": count })).into_response(),
        Err(e) => config_error_response(e),
    }
}

fn config_error_response(e: ConfigError) -> axum::response::Response {
    let status = match e {
        ConfigError::Duplicate(_) | ConfigError::Invalid(_) => StatusCode::BAD_REQUEST,
        ConfigError::NotFound(_) => StatusCode::NOT_FOUND,
        ConfigError::Io { .. } | ConfigError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

pub async fn handle_add_endpoint(
    State(state): State<AppState>,
    Json(endpoint): Json<Endpoint>,
) -> impl IntoResponse {
    match state.registry.add(endpoint).await {
        Ok(count) => Json(json!({ "success": true, "endpoints_count": count })).into_response(),
        Err(e) => config_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveEndpointQuery {
    pub url: String,
}

pub async fn handle_remove_endpoint(
    State(state): State<AppState>,
    Query(query): Query<RemoveEndpointQuery>,
) -> impl IntoResponse {
    match state.registry.remove(&query.url).await {
        Ok(count) => Json(json!({ "success": true, "endpoints_count": count })).into_response(),
        Err(e) => config_error_response(e),
    }
}
