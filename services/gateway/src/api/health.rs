use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::engine::Engine;

pub const SERVICE_NAME: &str = "Whagons Realtime Gateway";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthData {
    pub connected_sessions: usize,
    pub tenant_databases: usize,
    pub landlord_connected: bool,
    /// Seconds since process start.
    pub uptime: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub data: HealthData,
}

/// Liveness plus landlord reachability. An unreachable landlord degrades the
/// gateway (stale tenant set, no new tenants) but does not stop delivery, so
/// the body is returned either way; only the status code flips.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Gateway healthy", body = HealthResponse),
        (status = 503, description = "Landlord unreachable", body = HealthResponse)
    )
)]
pub async fn get_health(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let counts = engine.session_counts().await;
    let landlord_connected = engine.landlord_reachable().await;
    let status = if landlord_connected {
        "healthy"
    } else {
        "degraded"
    };
    let response = HealthResponse {
        status: status.to_string(),
        service: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        data: HealthData {
            connected_sessions: counts.total(),
            tenant_databases: engine.tenant_count().await,
            landlord_connected,
            uptime: engine.uptime_seconds(),
        },
    };
    let code = if landlord_connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

/// Structured counters for dashboards that want JSON rather than the
/// Prometheus exposition.
#[utoipa::path(
    get,
    path = "/api/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Structured gateway counters")
    )
)]
pub async fn get_metrics(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    let counts = engine.session_counts().await;
    let landlord_connected = engine.landlord_reachable().await;
    Json(serde_json::json!({
        "status": "success",
        "metrics": {
            "sessions": {
                "active_count": counts.active,
                "negotiating_count": counts.negotiating,
                "connected_count": counts.total(),
            },
            "databases": {
                "tenant_count": engine.tenant_count().await,
                "landlord_connected": landlord_connected,
            },
            "cache": {
                "token_entries": engine.token_cache().len(),
            },
            "system": {
                "uptime": engine.uptime_seconds(),
                "service": SERVICE_NAME,
                "version": SERVICE_VERSION,
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        },
    }))
}
