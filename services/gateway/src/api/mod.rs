//! Admin HTTP surface: health, counters, session management, tenant
//! reconciliation. Plumbing over the engine; every handler consults counters
//! or drives the session manager / landlord watcher code paths.

pub mod error;
pub mod health;
pub mod sessions;
pub mod tenants;

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::engine::Engine;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "whagons-gateway",
        version = "v1",
        description = "Whagons realtime gateway admin API"
    ),
    paths(
        health::get_health,
        health::get_metrics,
        sessions::get_sessions_count,
        sessions::disconnect_all_sessions,
        sessions::broadcast_message,
        tenants::reload_tenants,
        tenants::test_notification
    ),
    components(schemas(
        error::ErrorResponse,
        health::HealthData,
        health::HealthResponse,
        sessions::SessionCountResponse,
        sessions::BroadcastRequest,
        crate::registry::ReconcileSummary
    )),
    tags(
        (name = "health", description = "Health and metrics"),
        (name = "sessions", description = "Session management"),
        (name = "tenants", description = "Tenant reconciliation")
    )
)]
pub struct ApiDoc;

pub fn routes() -> Router<Arc<Engine>> {
    Router::new()
        .route("/api/health", get(health::get_health))
        .route("/api/metrics", get(health::get_metrics))
        .route("/api/sessions/count", get(sessions::get_sessions_count))
        .route(
            "/api/sessions/disconnect-all",
            post(sessions::disconnect_all_sessions),
        )
        .route("/api/broadcast", post(sessions::broadcast_message))
        .route("/api/tenants/reload", post(tenants::reload_tenants))
        .route(
            "/api/tenants/test-notification",
            post(tenants::test_notification),
        )
}
