use axum::Json;
use axum::extract::State;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;
use whagons_wire::SystemFrame;

use crate::api::error::{ApiError, bad_request};
use crate::engine::Engine;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionCountResponse {
    pub active_sessions: usize,
    pub negotiation_sessions: usize,
    pub total_sessions: usize,
}

#[utoipa::path(
    get,
    path = "/api/sessions/count",
    tag = "sessions",
    responses(
        (status = 200, description = "Current session counts", body = SessionCountResponse)
    )
)]
pub async fn get_sessions_count(State(engine): State<Arc<Engine>>) -> Json<SessionCountResponse> {
    let counts = engine.session_counts().await;
    Json(SessionCountResponse {
        active_sessions: counts.active,
        negotiation_sessions: counts.negotiating,
        total_sessions: counts.total(),
    })
}

#[utoipa::path(
    post,
    path = "/api/sessions/disconnect-all",
    tag = "sessions",
    responses(
        (status = 200, description = "All sessions disconnected")
    )
)]
pub async fn disconnect_all_sessions(State(engine): State<Arc<Engine>>) -> Json<Value> {
    let disconnected = engine.disconnect_all().await;
    Json(serde_json::json!({
        "status": "success",
        "message": "All sessions disconnected",
        "data": {
            "sessions_disconnected": disconnected,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        },
    }))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub frame_type: Option<String>,
    pub operation: Option<String>,
    pub message: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
}

/// Administratively injects a system frame into every active session.
/// `message` is required; type and operation default to `system/broadcast`.
#[utoipa::path(
    post,
    path = "/api/broadcast",
    tag = "sessions",
    request_body = BroadcastRequest,
    responses(
        (status = 200, description = "Message broadcast to active sessions"),
        (status = 400, description = "Missing message field", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn broadcast_message(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<Value>, ApiError> {
    let message = match body.message.as_deref() {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => return Err(bad_request("Message field is required", None)),
    };
    let frame_type = body.frame_type.unwrap_or_else(|| "system".to_string());
    let operation = body.operation.unwrap_or_else(|| "broadcast".to_string());

    let frame = SystemFrame::new(frame_type.clone(), operation.clone(), message.clone(), body.data);
    let reached = engine.broadcast_system(frame).await;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Message broadcasted successfully",
        "data": {
            "sessions_reached": reached,
            "broadcast_message": {
                "type": frame_type,
                "operation": operation,
                "message": message,
            },
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        },
    })))
}
