//! On-demand reconciliation.

use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;
use tether_core::SweepReport;

use super::{api_error, ApiError};
use crate::state::AppState;

/// Create sweep router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/sweep", post(run_sweep).get(last_sweep))
}

/// Run a sweep pass now
pub async fn run_sweep(State(state): State<Arc<AppState>>) -> Result<Json<SweepReport>, ApiError> {
    state.sweeper.run_now().await.map(Json).map_err(api_error)
}

/// Report of the most recent pass, if any
pub async fn last_sweep(State(state): State<Arc<AppState>>) -> Json<Option<SweepReport>> {
    Json(state.sweeper.last_report().await)
}
