//! Process-scoped engine state.
//!
//! One [`Engine`] is built at startup and handed to every subsystem behind an
//! `Arc`. Cross-subsystem references go through identifiers (tenant names,
//! session ids) resolved against the engine's tables, never through direct
//! ownership, so there are no reference cycles to manage.
//!
//! Locking: the tenant registry and the session tables each sit behind their
//! own `RwLock`; the two session stage tables and the authenticated-identity
//! map share ONE lock so the negotiating→active transition stays atomic. The
//! token cache is sharded internally. Nothing holds a lock across socket or
//! database I/O; every broadcast-shaped operation snapshots under the read
//! lock and acts on the copy.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};
use tokio::task::AbortHandle;
use whagons_authz::{AuthenticatedSession, TokenCache};

use crate::config::GatewayConfig;
use crate::registry::Tenant;

/// Per-session outbound queue depth. A session that backs this up is treated
/// as dead rather than allowed to block the router.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Frames headed for one session's transport writer.
#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Send failed because the transport writer is gone or hopelessly behind.
#[derive(Debug, thiserror::Error)]
#[error("session transport closed or backed up")]
pub struct SessionSendError;

/// Cheap handle to a connected session's outbound queue.
///
/// Enqueueing is non-blocking; the writer task on the other end owns the
/// actual socket, so holding a table lock while enqueueing never performs
/// network I/O.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: String,
    tx: mpsc::Sender<Outbound>,
}

impl SessionHandle {
    pub fn new(session_id: String, tx: mpsc::Sender<Outbound>) -> Self {
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn enqueue_text(&self, text: String) -> Result<(), SessionSendError> {
        self.tx
            .try_send(Outbound::Text(text))
            .map_err(|_| SessionSendError)
    }

    /// Best-effort close; a dead writer just means the peer is already gone.
    pub fn enqueue_close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.tx.try_send(Outbound::Close {
            code,
            reason: reason.into(),
        });
    }
}

/// Registry entry: tenant identity, its pooled connection, and the abort
/// handle of its change listener. Listener and pool live and die together.
pub struct TenantEntry {
    pub tenant: Tenant,
    pub pool: PgPool,
    pub listener: AbortHandle,
}

/// A session that authenticated but has not yet sent an inbound frame.
pub struct NegotiatingSession {
    pub handle: SessionHandle,
    pub timer: AbortHandle,
}

/// The three session maps guarded by one lock.
#[derive(Default)]
pub struct SessionTables {
    pub negotiating: HashMap<String, NegotiatingSession>,
    pub active: HashMap<String, SessionHandle>,
    pub auth: HashMap<String, AuthenticatedSession>,
}

pub struct Engine {
    config: GatewayConfig,
    landlord: PgPool,
    pub(crate) tenants: RwLock<HashMap<String, TenantEntry>>,
    pub(crate) sessions: RwLock<SessionTables>,
    pub(crate) token_cache: TokenCache,
    started_at: DateTime<Utc>,
}

impl Engine {
    pub fn new(config: GatewayConfig, landlord: PgPool) -> Self {
        Self {
            config,
            landlord,
            tenants: RwLock::new(HashMap::new()),
            sessions: RwLock::new(SessionTables::default()),
            token_cache: TokenCache::new(),
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn landlord(&self) -> &PgPool {
        &self.landlord
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Liveness probe against the landlord; drives the health endpoint's
    /// healthy/degraded split.
    pub async fn landlord_reachable(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.landlord).await.is_ok()
    }

    pub async fn tenant_count(&self) -> usize {
        self.tenants.read().await.len()
    }

    /// Final teardown: cancel every tenant listener and close every pool.
    /// Sessions are expected to have been drained by `disconnect_all` first.
    pub async fn shutdown(&self) {
        let entries: Vec<TenantEntry> = {
            let mut tenants = self.tenants.write().await;
            tenants.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.listener.abort();
            entry.pool.close().await;
            tracing::info!(tenant = %entry.tenant.name, "closed tenant database");
        }
        self.landlord.close().await;
        tracing::info!("closed landlord database");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::registry;
    use std::sync::Arc;
    use tokio::sync::mpsc::Receiver;

    /// Engine wired to a lazily-initialized pool pointing at a dead port; no
    /// database is ever reached unless a test insists on it. The config is
    /// built directly so environment mutations in other tests cannot leak in.
    pub fn test_config() -> GatewayConfig {
        GatewayConfig {
            db_host: "127.0.0.1".to_string(),
            db_port: 1,
            db_username: "postgres".to_string(),
            db_password: String::new(),
            db_landlord: "landlord".to_string(),
            server_port: 8082,
            metrics_bind: "127.0.0.1:0".parse().expect("metrics bind"),
            tenant_channel: "whagons_tasks_changes".to_string(),
            landlord_channel: "tenant_changes".to_string(),
            negotiation_timeout: std::time::Duration::from_secs(15),
            reaper_interval: std::time::Duration::from_secs(30),
            idle_ping_interval: std::time::Duration::from_secs(90),
            cache_ttl: std::time::Duration::from_secs(300),
        }
    }

    pub fn test_engine() -> Arc<Engine> {
        let config = test_config();
        let landlord = registry::landlord_pool(&config);
        Arc::new(Engine::new(config, landlord))
    }

    /// Session handle backed by a plain channel; dropping the receiver makes
    /// the handle look like a dead transport.
    pub fn test_handle(session_id: &str) -> (SessionHandle, Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        (SessionHandle::new(session_id.to_string(), tx), rx)
    }

    pub fn test_auth(session_id: &str, tenant: &str) -> AuthenticatedSession {
        AuthenticatedSession {
            session_id: session_id.to_string(),
            tenant_name: tenant.to_string(),
            subject_id: 42,
            token_id: 7,
            abilities: whagons_authz::Abilities::wildcard(),
            token_expires_at: None,
            last_used_at: Utc::now(),
        }
    }

    pub fn noop_abort_handle() -> AbortHandle {
        tokio::spawn(async {}).abort_handle()
    }
}
