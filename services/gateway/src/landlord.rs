//! Landlord watcher: keeps the tenant registry and listener set converged
//! with the landlord's tenants table.
//!
//! The watcher holds a LISTEN subscription on the landlord channel. The
//! payload is not load-bearing; any signal triggers a full reconcile, which
//! is also what the admin reload endpoint invokes. Reconcile failures are
//! soft: the gateway keeps serving the stale tenant set and health reports
//! degraded until the landlord comes back.

use anyhow::{Context, Result};
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::engine::Engine;
use crate::registry;

const INITIAL_BACKOFF: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub fn spawn_landlord_watcher(engine: Arc<Engine>) -> AbortHandle {
    let handle = tokio::spawn(async move {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let started = Instant::now();
            if let Err(err) = run_watcher(&engine).await {
                tracing::warn!(error = %err, "landlord watcher exited");
            }
            if started.elapsed() > MAX_BACKOFF {
                backoff = INITIAL_BACKOFF;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    });
    handle.abort_handle()
}

async fn run_watcher(engine: &Arc<Engine>) -> Result<()> {
    let channel = engine.config().landlord_channel.clone();
    let mut listener = PgListener::connect_with(engine.landlord())
        .await
        .context("open landlord listener")?;
    listener
        .listen(&channel)
        .await
        .with_context(|| format!("listen on {channel}"))?;
    tracing::info!(channel = %channel, "watching landlord for tenant changes");

    loop {
        let notification = listener.recv().await.context("landlord receive")?;
        tracing::info!(payload = %notification.payload(), "landlord change signal");
        match registry::reconcile_tenants(engine).await {
            Ok(summary) => {
                if summary.added > 0 || summary.removed > 0 {
                    tracing::info!(
                        added = summary.added,
                        removed = summary.removed,
                        total = summary.total,
                        "tenant set reconciled"
                    );
                }
            }
            Err(err) => {
                // Keep running with the stale tenant set.
                tracing::warn!(error = %err, "tenant reconcile failed");
            }
        }
    }
}
