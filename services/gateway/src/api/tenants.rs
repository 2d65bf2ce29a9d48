use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::api::error::{ApiError, internal};
use crate::engine::Engine;
use crate::registry;

/// Forces a reconcile of the tenant set against the landlord; same code path
/// the landlord watcher runs on a change signal.
#[utoipa::path(
    post,
    path = "/api/tenants/reload",
    tag = "tenants",
    responses(
        (status = 200, description = "Tenant set reconciled", body = registry::ReconcileSummary),
        (status = 500, description = "Landlord unreachable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn reload_tenants(State(engine): State<Arc<Engine>>) -> Result<Json<Value>, ApiError> {
    let summary = registry::reconcile_tenants(&engine)
        .await
        .map_err(|err| internal("failed to reload tenants", err))?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Tenant set reconciled",
        "data": summary,
    })))
}

/// Emits a synthetic payload on the landlord channel so the full
/// watcher → reconcile wiring can be verified end to end.
#[utoipa::path(
    post,
    path = "/api/tenants/test-notification",
    tag = "tenants",
    responses(
        (status = 200, description = "Synthetic notification emitted"),
        (status = 500, description = "Landlord unreachable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn test_notification(State(engine): State<Arc<Engine>>) -> Result<Json<Value>, ApiError> {
    let channel = engine.config().landlord_channel.clone();
    let payload = serde_json::json!({
        "table": "tenants",
        "operation": "UPDATE",
        "timestamp": Utc::now().timestamp() as f64,
    })
    .to_string();

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(&channel)
        .bind(&payload)
        .execute(engine.landlord())
        .await
        .map_err(|err| internal("failed to emit test notification", err))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Test notification emitted",
        "data": {
            "channel": channel,
            "payload": payload,
        },
    })))
}
