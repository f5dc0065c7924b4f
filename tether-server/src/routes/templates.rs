//! Template registry routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tether_core::types::RegisteredTemplate;
use tether_core::{Notification, Outcome};
use tracing::info;

use super::{api_error, dispatch, ApiError};
use crate::state::AppState;

/// Create template router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/templates", get(list_templates).post(register_template))
        .route("/templates/{id}", delete(unregister_template))
        .route("/templates/{id}/reclaim", post(reclaim))
}

#[derive(Debug, Deserialize)]
pub struct RegisterTemplateRequest {
    pub id: String,
    pub display_name: String,
    pub parent_group_id: Option<String>,
}

/// List registered voice templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RegisteredTemplate>>, ApiError> {
    state.store.list_templates().map(Json).map_err(api_error)
}

/// Register a base voice channel
pub async fn register_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterTemplateRequest>,
) -> Result<(StatusCode, Json<RegisteredTemplate>), ApiError> {
    if req.id.trim().is_empty() || req.display_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "id and display_name are required".to_string(),
        ));
    }

    let template = RegisteredTemplate {
        id: req.id,
        display_name: req.display_name,
        parent_group_id: req.parent_group_id,
        created_at: chrono::Utc::now().timestamp_millis(),
    };
    state.store.register_template(&template).map_err(api_error)?;
    info!(template_id = %template.id, name = %template.display_name, "Template registered");

    Ok((StatusCode::CREATED, Json(template)))
}

/// Remove a template from the registry. Its active companion, if any, is
/// left to be reclaimed once empty.
pub async fn unregister_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state.store.unregister_template(&id).map_err(api_error)?;
    if !removed {
        return Err((StatusCode::NOT_FOUND, format!("Template not found: {}", id)));
    }
    info!(template_id = %id, "Template unregistered");
    Ok(StatusCode::NO_CONTENT)
}

/// Explicit reclaim trigger
pub async fn reclaim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Outcome>, ApiError> {
    dispatch(&state, Notification::Reclaim { template_id: id })
        .await
        .map(Json)
}
