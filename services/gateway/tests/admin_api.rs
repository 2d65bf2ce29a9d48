//! Admin surface tests against the assembled router.
//!
//! The engine is wired to a lazily-connecting pool aimed at a dead port, so
//! every landlord-touching path exercises the degraded branch without any
//! database in the picture.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gateway::{Engine, GatewayConfig};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn dead_db_engine() -> Arc<Engine> {
    // Port 1 refuses immediately; the pool never sees a live server.
    let config = GatewayConfig {
        db_host: "127.0.0.1".to_string(),
        db_port: 1,
        db_username: "postgres".to_string(),
        db_password: String::new(),
        db_landlord: "landlord".to_string(),
        server_port: 8082,
        metrics_bind: "127.0.0.1:0".parse().expect("metrics bind"),
        tenant_channel: "whagons_tasks_changes".to_string(),
        landlord_channel: "tenant_changes".to_string(),
        negotiation_timeout: Duration::from_secs(15),
        reaper_interval: Duration::from_secs(30),
        idle_ping_interval: Duration::from_secs(90),
        cache_ttl: Duration::from_secs(300),
    };
    let landlord = gateway::registry::landlord_pool(&config);
    Arc::new(Engine::new(config, landlord))
}

fn app() -> axum::Router {
    gateway::app::build_app(dead_db_engine())
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn health_reports_degraded_without_landlord() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let payload = read_json(response).await;
    assert_eq!(payload["status"], "degraded");
    assert_eq!(payload["service"], "Whagons Realtime Gateway");
    assert_eq!(payload["data"]["landlord_connected"], false);
    assert_eq!(payload["data"]["connected_sessions"], 0);
    assert_eq!(payload["data"]["tenant_databases"], 0);
}

#[tokio::test]
async fn session_count_starts_at_zero() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/sessions/count")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["active_sessions"], 0);
    assert_eq!(payload["negotiation_sessions"], 0);
    assert_eq!(payload["total_sessions"], 0);
}

#[tokio::test]
async fn broadcast_requires_a_message() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/api/broadcast",
            serde_json::json!({"type": "system"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let payload = read_json(response).await;
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["message"], "Message field is required");
}

#[tokio::test]
async fn broadcast_defaults_type_and_operation() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/api/broadcast",
            serde_json::json!({"message": "maintenance at noon"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["status"], "success");
    assert_eq!(payload["data"]["sessions_reached"], 0);
    assert_eq!(payload["data"]["broadcast_message"]["type"], "system");
    assert_eq!(payload["data"]["broadcast_message"]["operation"], "broadcast");
}

#[tokio::test]
async fn disconnect_all_on_empty_gateway_is_clean() {
    let app = app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sessions/disconnect-all",
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["data"]["sessions_disconnected"], 0);

    // Count is still zero afterwards.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sessions/count")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let payload = read_json(response).await;
    assert_eq!(payload["total_sessions"], 0);
}

#[tokio::test]
async fn tenant_reload_fails_softly_without_landlord() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/api/tenants/reload",
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let payload = read_json(response).await;
    assert_eq!(payload["status"], "error");
    assert!(payload["error"].is_string());
}

#[tokio::test]
async fn test_notification_fails_softly_without_landlord() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/api/tenants/test-notification",
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let payload = read_json(response).await;
    assert_eq!(payload["status"], "error");
}

#[tokio::test]
async fn metrics_returns_structured_counters() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/metrics")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["status"], "success");
    assert_eq!(payload["metrics"]["sessions"]["connected_count"], 0);
    assert_eq!(payload["metrics"]["databases"]["landlord_connected"], false);
    assert_eq!(
        payload["metrics"]["system"]["service"],
        "Whagons Realtime Gateway"
    );
}
