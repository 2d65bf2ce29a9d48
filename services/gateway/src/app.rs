//! Router assembly: admin API + WebSocket endpoint + middleware.

use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::api;
use crate::engine::Engine;
use crate::ws;

/// Builds the full application router.
///
/// Browser transports negotiate over plain HTTP before upgrading, so the
/// CORS layer stays permissive; tightening origins belongs to a fronting
/// proxy, not the gateway.
pub fn build_app(engine: Arc<Engine>) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri()
            )
        });
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::routes())
        .route("/ws", get(ws::ws_handler))
        // SockJS-style clients append a transport suffix; same handler.
        .route("/ws/websocket", get(ws::ws_handler))
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs")
                .url("/api/openapi.json", api::ApiDoc::openapi()),
        )
        .layer(cors)
        .layer(trace_layer)
        .with_state(engine)
}
