// Gateway service entry point.
use anyhow::{Context, Result};
use gateway::{Engine, GatewayConfig};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let metrics_handle = gateway::observability::init_observability("whagons-gateway");

    let config = GatewayConfig::load().context("load gateway config")?;
    let landlord = gateway::registry::landlord_pool(&config);
    let engine = Arc::new(Engine::new(config.clone(), landlord));

    // Database trouble degrades; it never stops the process from serving.
    match gateway::registry::reconcile_tenants(&engine).await {
        Ok(summary) => {
            tracing::info!(total = summary.total, "tenant databases loaded");
        }
        Err(err) => {
            tracing::warn!(error = %err, "initial tenant load failed; starting degraded");
        }
    }

    let watcher = gateway::landlord::spawn_landlord_watcher(engine.clone());
    let reaper = gateway::sessions::spawn_zombie_reaper(engine.clone());
    let sweeper = gateway::auth::spawn_cache_sweeper(engine.clone());
    tokio::spawn(gateway::observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = gateway::app::build_app(engine.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    // The HTTP surface is the one thing startup is allowed to die on.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "gateway listening");
    tracing::info!("websocket endpoint mounted at /ws");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serve gateway")?;

    // Drain sessions first, then cancel background tasks, then close pools.
    tracing::info!("shutting down");
    engine.disconnect_all().await;
    watcher.abort();
    reaper.abort();
    sweeper.abort();
    engine.shutdown().await;
    tracing::info!("gateway stopped");
    Ok(())
}
