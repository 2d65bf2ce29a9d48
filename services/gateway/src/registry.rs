//! Tenant registry: landlord-backed tenant resolution and the pool of
//! per-tenant database handles.
//!
//! The registry is the authoritative in-process view of "which tenants exist
//! and how do I reach their databases". It is seeded at startup and kept in
//! sync by the landlord watcher through [`reconcile_tenants`]; resolution by
//! domain always goes to the landlord so newly added tenants authenticate
//! without waiting for a reconcile pass.

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::engine::{Engine, TenantEntry};
use crate::listener;

/// Tenant row as enumerated by the landlord. Rows whose `database` column is
/// NULL never reach this type; they are filtered in SQL.
#[derive(Debug, Clone, FromRow)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub database: String,
}

/// Outcome of one reconcile pass, reported by the admin reload endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize, utoipa::ToSchema)]
pub struct ReconcileSummary {
    pub added: usize,
    pub removed: usize,
    pub total: usize,
}

// Pool sizing: the gateway reads tiny rows at connection-handshake rate, so a
// handful of connections per database is plenty. Acquire timeouts keep a sick
// database from hanging handshakes.
const POOL_MAX_CONNECTIONS: u32 = 5;
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

fn connect_options(config: &GatewayConfig, database: &str) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.db_host)
        .port(config.db_port)
        .username(&config.db_username)
        .password(&config.db_password)
        .database(database)
}

/// Lazily-connecting landlord pool. Startup never fails on an unreachable
/// landlord; health just reports degraded until it comes back.
pub fn landlord_pool(config: &GatewayConfig) -> PgPool {
    PgPoolOptions::new()
        .max_connections(POOL_MAX_CONNECTIONS)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
        .connect_lazy_with(connect_options(config, &config.db_landlord))
}

impl Engine {
    /// Resolves a tenant by exact domain match against the landlord.
    /// `Ok(None)` means the domain is unknown (or has no database); `Err`
    /// means the landlord itself could not be queried.
    pub async fn resolve_by_domain(&self, domain: &str) -> sqlx::Result<Option<Tenant>> {
        sqlx::query_as::<_, Tenant>(
            "SELECT id, name, domain, database FROM tenants \
             WHERE domain = $1 AND database IS NOT NULL",
        )
        .bind(domain)
        .fetch_optional(self.landlord())
        .await
    }

    /// Connection handle for a known tenant. Pools are reference-stable for
    /// the lifetime of the tenant; callers clone the cheap pool handle.
    pub async fn connection_for(&self, tenant_name: &str) -> Option<PgPool> {
        self.tenants
            .read()
            .await
            .get(tenant_name)
            .map(|entry| entry.pool.clone())
    }

    pub async fn tenant_names(&self) -> Vec<String> {
        self.tenants.read().await.keys().cloned().collect()
    }

    /// Removes a tenant, cancelling its listener and closing its pool.
    pub async fn remove_tenant(&self, tenant_name: &str) {
        let entry = self.tenants.write().await.remove(tenant_name);
        if let Some(entry) = entry {
            entry.listener.abort();
            entry.pool.close().await;
            tracing::info!(tenant = %tenant_name, "tenant removed");
        }
    }
}

/// Rereads the tenants table and converges the registry on it: new tenants
/// get a verified connection and a change listener, vanished tenants lose
/// both. Safe to call repeatedly; a second pass right after the first is a
/// no-op.
pub async fn reconcile_tenants(engine: &Arc<Engine>) -> Result<ReconcileSummary> {
    let desired = sqlx::query_as::<_, Tenant>(
        "SELECT id, name, domain, database FROM tenants WHERE database IS NOT NULL",
    )
    .fetch_all(engine.landlord())
    .await
    .context("query tenants")?;

    let desired_names: HashSet<String> = desired.iter().map(|t| t.name.clone()).collect();
    let current_names: HashSet<String> = engine.tenant_names().await.into_iter().collect();

    let mut removed = 0;
    for stale in current_names.difference(&desired_names) {
        engine.remove_tenant(stale).await;
        removed += 1;
    }

    let mut added = 0;
    for tenant in desired {
        match upsert_tenant(engine, tenant).await {
            Ok(true) => added += 1,
            Ok(false) => {}
            Err(err) => {
                // Unreachable tenants are skipped, not fatal; the next
                // reconcile retries them.
                tracing::warn!(error = %err, "failed to connect tenant database");
            }
        }
    }

    let total = engine.tenant_count().await;
    Ok(ReconcileSummary {
        added,
        removed,
        total,
    })
}

/// Makes one tenant known: opens and verifies its pool and spawns its change
/// listener. Already-registered tenants keep their existing handle (pools
/// are reference-stable for the tenant's lifetime). Returns whether a new
/// entry was created.
pub async fn upsert_tenant(engine: &Arc<Engine>, tenant: Tenant) -> Result<bool> {
    if engine.tenants.read().await.contains_key(&tenant.name) {
        return Ok(false);
    }
    let pool = connect_tenant(engine, &tenant).await?;
    let listener =
        listener::spawn_tenant_listener(engine.clone(), tenant.name.clone(), pool.clone());
    let name = tenant.name.clone();
    {
        // Concurrent reconciles may race to the same tenant; first one in
        // wins and the loser tears its handles back down.
        let mut tenants = engine.tenants.write().await;
        if tenants.contains_key(&name) {
            drop(tenants);
            listener.abort();
            pool.close().await;
            return Ok(false);
        }
        tenants.insert(
            name.clone(),
            TenantEntry {
                tenant,
                pool,
                listener,
            },
        );
    }
    tracing::info!(tenant = %name, "connected to tenant database");
    Ok(true)
}

/// Opens and pings a tenant pool; an unreachable database is an error here
/// and a skip at the call site.
async fn connect_tenant(engine: &Arc<Engine>, tenant: &Tenant) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(POOL_MAX_CONNECTIONS)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
        .connect_with(connect_options(engine.config(), &tenant.database))
        .await
        .with_context(|| format!("open tenant database {}", tenant.database))?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .with_context(|| format!("ping tenant database {}", tenant.database))?;
    Ok(pool)
}
