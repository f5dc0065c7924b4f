//! API route modules.

pub mod health;
pub mod mappings;
pub mod notifications;
pub mod sweep;
pub mod templates;

use axum::{http::StatusCode, routing::get, Router};
use std::sync::Arc;
use tether_core::{Error, Notification, Outcome};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/health", get(health::health_check));

    let api_routes = Router::new()
        .merge(notifications::router())
        .merge(mappings::router())
        .merge(templates::router())
        .merge(sweep::router());

    Router::new()
        .merge(public_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub type ApiError = (StatusCode, String);

/// Map a core error onto an HTTP status.
pub fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::AdapterTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::AdapterRejected { .. } => StatusCode::BAD_GATEWAY,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Hand a notification to the dispatcher and wait for its outcome.
///
/// The transition runs on its own task and completes even if the caller
/// disconnects.
pub async fn dispatch(state: &AppState, notification: Notification) -> Result<Outcome, ApiError> {
    match state.dispatcher.dispatch(notification).await {
        Ok(result) => result.map_err(api_error),
        Err(e) => {
            error!(error = %e, "Notification task failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
