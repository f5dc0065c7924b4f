//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub metrics: HealthMetrics,
}

#[derive(Serialize)]
pub struct HealthComponents {
    pub database: bool,
    pub sweeper: bool,
}

#[derive(Serialize)]
pub struct HealthMetrics {
    pub active_mappings: usize,
    pub archived_mappings: usize,
    pub registered_templates: usize,
    pub last_sweep_at: Option<i64>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let db_healthy = state.store.ping().is_ok();
    let sweeper_running = state.sweeper.is_running().await;

    let active_mappings = state.store.list().map(|m| m.len()).unwrap_or(0);
    let archived_mappings = state.store.list_archived().map(|m| m.len()).unwrap_or(0);
    let registered_templates = state.store.list_templates().map(|t| t.len()).unwrap_or(0);
    let last_sweep_at = state.sweeper.last_report().await.map(|r| r.finished_at);

    let status = if db_healthy && sweeper_running {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            database: db_healthy,
            sweeper: sweeper_running,
        },
        metrics: HealthMetrics {
            active_mappings,
            archived_mappings,
            registered_templates,
            last_sweep_at,
        },
    })
}
