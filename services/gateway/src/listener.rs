//! Per-tenant change listeners over Postgres LISTEN/NOTIFY.
//!
//! Each tenant gets one supervised task holding a dedicated listener
//! connection on the configured channel. Single bad notifications are logged
//! and dropped; anything that kills the connection (receive error, failed
//! liveness ping) ends the attempt and the supervisor respawns it with
//! capped exponential backoff. Within one tenant, events reach the router in
//! the order the database emitted them.

use anyhow::{Context, Result};
use metrics::counter;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use whagons_wire::ChangeEvent;

use crate::engine::Engine;

const INITIAL_BACKOFF: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Spawns the supervised listener for one tenant. The returned handle is
/// stored in the tenant's registry entry and aborted on removal.
pub fn spawn_tenant_listener(engine: Arc<Engine>, tenant_name: String, pool: PgPool) -> AbortHandle {
    let handle = tokio::spawn(async move {
        supervise(engine, tenant_name, pool).await;
    });
    handle.abort_handle()
}

async fn supervise(engine: Arc<Engine>, tenant_name: String, pool: PgPool) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let started = Instant::now();
        if let Err(err) = run_listener(&engine, &tenant_name, &pool).await {
            tracing::warn!(tenant = %tenant_name, error = %err, "change listener exited");
        }
        // A run that survived past the cap counts as healthy; start the
        // backoff ladder over.
        if started.elapsed() > MAX_BACKOFF {
            backoff = INITIAL_BACKOFF;
        }
        tracing::info!(tenant = %tenant_name, delay_secs = backoff.as_secs(), "restarting change listener");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn run_listener(engine: &Arc<Engine>, tenant_name: &str, pool: &PgPool) -> Result<()> {
    let channel = engine.config().tenant_channel.clone();
    let mut listener = PgListener::connect_with(pool)
        .await
        .context("open listener connection")?;
    listener
        .listen(&channel)
        .await
        .with_context(|| format!("listen on {channel}"))?;
    tracing::info!(tenant = %tenant_name, channel = %channel, "listening for tenant changes");

    loop {
        match tokio::time::timeout(engine.config().idle_ping_interval, listener.recv()).await {
            Ok(Ok(notification)) => {
                counter!("gateway_notifications_total").increment(1);
                match ChangeEvent::parse(tenant_name, notification.payload()) {
                    Ok(event) => {
                        engine.publish_change(&event).await;
                    }
                    Err(err) => {
                        // Dropped, never fatal to the subscription.
                        counter!("gateway_notification_parse_failures_total").increment(1);
                        tracing::warn!(tenant = %tenant_name, error = %err, "dropping unparseable notification");
                    }
                }
            }
            Ok(Err(err)) => return Err(err).context("notification receive"),
            Err(_idle) => {
                // No traffic for the idle window; make sure the database is
                // still there before waiting another round.
                sqlx::query("SELECT 1")
                    .execute(pool)
                    .await
                    .context("liveness ping")?;
                tracing::debug!(tenant = %tenant_name, "idle liveness ping ok");
            }
        }
    }
}
