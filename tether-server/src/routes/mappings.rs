//! Mapping inspection routes.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tether_core::types::{ArchivedEntry, LifecycleState, MappingEntry};

use super::{api_error, ApiError};
use crate::state::AppState;

/// Create mapping router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mappings", get(list_mappings))
        .route("/mappings/archive", get(list_archived))
        .route("/mappings/{template_id}", get(get_mapping))
}

#[derive(Debug, Serialize)]
pub struct MappingStatus {
    pub template_id: String,
    pub state: LifecycleState,
    pub mapping: Option<MappingEntry>,
    pub archived: Option<ArchivedEntry>,
}

/// List active mappings
pub async fn list_mappings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MappingEntry>>, ApiError> {
    state.store.list().map(Json).map_err(api_error)
}

/// List archived (locked) companions
pub async fn list_archived(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ArchivedEntry>>, ApiError> {
    state.store.list_archived().map(Json).map_err(api_error)
}

/// Lifecycle state of one template
pub async fn get_mapping(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<String>,
) -> Result<Json<MappingStatus>, ApiError> {
    let lifecycle = state.manager.state(&template_id).map_err(api_error)?;
    let mapping = state.store.get(&template_id).map_err(api_error)?;
    let archived = state.store.get_archived(&template_id).map_err(api_error)?;

    Ok(Json(MappingStatus {
        template_id,
        state: lifecycle,
        mapping,
        archived,
    }))
}
