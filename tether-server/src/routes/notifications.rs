//! Platform notification intake.
//!
//! The bot framework forwards platform events here. Every handler waits
//! for the lifecycle outcome and returns it as JSON.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tether_core::membership::VoiceStateChange;
use tether_core::types::{MembershipKind, Template};
use tether_core::{Notification, Outcome};

use super::{api_error, dispatch, ApiError};
use crate::state::AppState;

/// Create notification router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications/template-membership", post(template_membership))
        .route("/notifications/template-created", post(template_created))
        .route("/notifications/template-updated", post(template_updated))
        .route("/notifications/template-terminal", post(template_terminal))
        .route("/notifications/companion-membership", post(companion_membership))
        .route("/notifications/voice-state", post(voice_state))
        .route("/notifications/subscriber-added", post(subscriber_added))
        .route("/notifications/subscriber-removed", post(subscriber_removed))
}

#[derive(Debug, Deserialize)]
pub struct TemplateMembershipRequest {
    pub template_id: String,
    pub kind: MembershipKind,
    pub member_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateTerminalRequest {
    pub template_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CompanionMembershipRequest {
    pub companion_id: String,
    pub member_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubscriberRequest {
    pub template_id: String,
    pub identity_id: String,
}

pub async fn template_membership(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TemplateMembershipRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let notification = Notification::TemplateMembership {
        template_id: req.template_id,
        kind: req.kind,
        member_id: req.member_id,
    };
    dispatch(&state, notification).await.map(Json)
}

pub async fn template_created(
    State(state): State<Arc<AppState>>,
    Json(template): Json<Template>,
) -> Result<Json<Outcome>, ApiError> {
    dispatch(&state, Notification::TemplateCreated { template })
        .await
        .map(Json)
}

pub async fn template_updated(
    State(state): State<Arc<AppState>>,
    Json(template): Json<Template>,
) -> Result<Json<Outcome>, ApiError> {
    dispatch(&state, Notification::TemplateUpdated { template })
        .await
        .map(Json)
}

pub async fn template_terminal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TemplateTerminalRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let notification = Notification::TemplateTerminal {
        template_id: req.template_id,
    };
    dispatch(&state, notification).await.map(Json)
}

pub async fn companion_membership(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompanionMembershipRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let notification = Notification::CompanionMembership {
        companion_id: req.companion_id,
        member_count: req.member_count,
    };
    dispatch(&state, notification).await.map(Json)
}

/// Raw voice-state change; may fan out into several triggers.
pub async fn voice_state(
    State(state): State<Arc<AppState>>,
    Json(change): Json<VoiceStateChange>,
) -> Result<Json<Vec<Outcome>>, ApiError> {
    state
        .dispatcher
        .handle_voice_state(&change)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn subscriber_added(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscriberRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let notification = Notification::SubscriberAdded {
        template_id: req.template_id,
        identity_id: req.identity_id,
    };
    dispatch(&state, notification).await.map(Json)
}

pub async fn subscriber_removed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscriberRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let notification = Notification::SubscriberRemoved {
        template_id: req.template_id,
        identity_id: req.identity_id,
    };
    dispatch(&state, notification).await.map(Json)
}

#[cfg(test)]
mod tests {
    use crate::routes::create_router;
    use crate::routes::test_support::{app_state, body_json, json_request};
    use axum::http::StatusCode;
    use serde_json::json;
    use tether_core::types::RegisteredTemplate;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_event_lifecycle_over_http() {
        let (state, gateway) = app_state();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/notifications/template-created",
                json!({
                    "id": "e-1",
                    "display_name": "Raid Night",
                    "parent_group_id": null,
                    "kind": "event_thread",
                    "creator_id": "owner"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "provisioned");
        let companion_id = body["companion_id"].as_str().unwrap().to_string();
        assert!(gateway.companion(&companion_id).unwrap().has_member("owner"));

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/notifications/template-terminal",
                json!({ "template_id": "e-1" }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "locked");
        assert!(state.store.get_archived("e-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_voice_state_provisions_room() {
        let (state, _gateway) = app_state();
        state
            .store
            .register_template(&RegisteredTemplate {
                id: "t-1".into(),
                display_name: "Lounge".into(),
                parent_group_id: None,
                created_at: 0,
            })
            .unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/notifications/voice-state",
                json!({
                    "member_id": "u-1",
                    "joined": { "id": "t-1", "member_count": 1 }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["outcome"], "provisioned");
        assert_eq!(body[0]["name"], "Lounge #1");
    }

    #[tokio::test]
    async fn test_gateway_rejection_maps_to_bad_gateway() {
        let (state, gateway) = app_state();
        gateway.fail_next("create_companion", 1);
        let app = create_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/notifications/template-created",
                json!({
                    "id": "e-1",
                    "display_name": "Raid Night",
                    "parent_group_id": null,
                    "kind": "event_thread"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let (state, _gateway) = app_state();
        let app = create_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/notifications/companion-membership",
                json!({ "companion_id": "c-1" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
