//! Two-stage session table and its maintenance tasks.
//!
//! Sessions enter **negotiating** once authenticated and a welcome frame is
//! queued, and move to **active** on their first inbound frame. Only active
//! sessions receive broadcasts and change events; the negotiation stage
//! filters out transient transport probes without racing transport
//! internals. A session id is in at most one stage table at any time, and
//! every registered id has an authenticated identity.

use metrics::counter;
use std::sync::Arc;
use tokio::task::AbortHandle;
use whagons_authz::AuthenticatedSession;
use whagons_wire::{CLOSE_NORMAL, CLOSE_POLICY, SystemFrame};

use crate::engine::{Engine, NegotiatingSession, SessionHandle};

#[derive(Debug, Clone, Copy)]
pub struct SessionCounts {
    pub active: usize,
    pub negotiating: usize,
}

impl SessionCounts {
    pub fn total(&self) -> usize {
        self.active + self.negotiating
    }
}

impl Engine {
    /// Registers a freshly authenticated session in the negotiating table.
    /// The caller must already have enqueued the welcome frame; registration
    /// never precedes it.
    pub async fn register_negotiating(
        &self,
        handle: SessionHandle,
        auth: AuthenticatedSession,
        timer: AbortHandle,
    ) {
        let session_id = handle.session_id().to_string();
        let mut tables = self.sessions.write().await;
        tables
            .negotiating
            .insert(session_id.clone(), NegotiatingSession { handle, timer });
        tables.auth.insert(session_id, auth);
        counter!("gateway_sessions_opened_total").increment(1);
    }

    /// Moves a session from negotiating to active, cancelling its timer.
    /// Returns false when the session is not negotiating (already promoted,
    /// timed out, or gone); the transition is atomic either way.
    pub async fn promote(&self, session_id: &str) -> bool {
        let mut tables = self.sessions.write().await;
        match tables.negotiating.remove(session_id) {
            Some(negotiating) => {
                negotiating.timer.abort();
                tables
                    .active
                    .insert(session_id.to_string(), negotiating.handle);
                true
            }
            None => false,
        }
    }

    /// Negotiation timer expiry: if the session never promoted, drop it and
    /// close the transport.
    pub async fn expire_negotiation(&self, session_id: &str) {
        let expired = {
            let mut tables = self.sessions.write().await;
            let entry = tables.negotiating.remove(session_id);
            if entry.is_some() {
                tables.auth.remove(session_id);
            }
            entry
        };
        if let Some(entry) = expired {
            tracing::info!(session = %session_id, "negotiation timed out");
            counter!("gateway_sessions_negotiation_timeouts_total").increment(1);
            entry.handle.enqueue_close(CLOSE_POLICY, "Negotiation timeout");
        }
    }

    /// Removes a session from every table, whatever stage it is in.
    pub async fn remove_session(&self, session_id: &str) {
        let mut tables = self.sessions.write().await;
        if let Some(negotiating) = tables.negotiating.remove(session_id) {
            negotiating.timer.abort();
        }
        tables.active.remove(session_id);
        tables.auth.remove(session_id);
    }

    /// Batch removal of sessions whose transports failed mid-send. One write
    /// lock for the whole batch.
    pub(crate) async fn prune_sessions(&self, session_ids: &[String]) {
        if session_ids.is_empty() {
            return;
        }
        let mut tables = self.sessions.write().await;
        for session_id in session_ids {
            if let Some(negotiating) = tables.negotiating.remove(session_id) {
                negotiating.timer.abort();
            }
            tables.active.remove(session_id);
            tables.auth.remove(session_id);
            tracing::debug!(session = %session_id, "pruned dead session");
        }
        counter!("gateway_sessions_pruned_total").increment(session_ids.len() as u64);
    }

    pub async fn session_counts(&self) -> SessionCounts {
        let tables = self.sessions.read().await;
        SessionCounts {
            active: tables.active.len(),
            negotiating: tables.negotiating.len(),
        }
    }

    /// Sends a system frame to every ACTIVE session, stamped per recipient.
    /// Returns how many sends were enqueued successfully.
    pub async fn broadcast_system(&self, frame: SystemFrame) -> usize {
        let handles: Vec<SessionHandle> = {
            let tables = self.sessions.read().await;
            tables.active.values().cloned().collect()
        };

        let mut sent = 0;
        let mut failed = Vec::new();
        for handle in handles {
            let stamped = frame.clone().with_session(handle.session_id());
            if handle.enqueue_text(stamped.to_json()).is_ok() {
                sent += 1;
            } else {
                failed.push(handle.session_id().to_string());
            }
        }
        self.prune_sessions(&failed).await;
        if sent > 0 {
            tracing::info!(count = sent, operation = %frame.operation, "broadcast system frame");
        }
        sent
    }

    /// Liveness sweep over BOTH stage tables. A failed enqueue means the
    /// writer task is gone, which means the transport is dead.
    pub async fn reap_zombies(&self) -> usize {
        let handles: Vec<SessionHandle> = {
            let tables = self.sessions.read().await;
            tables
                .active
                .values()
                .cloned()
                .chain(tables.negotiating.values().map(|entry| entry.handle.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for handle in handles {
            let ping = SystemFrame::health_check().with_session(handle.session_id());
            if handle.enqueue_text(ping.to_json()).is_err() {
                dead.push(handle.session_id().to_string());
            }
        }
        let reaped = dead.len();
        self.prune_sessions(&dead).await;
        if reaped > 0 {
            tracing::info!(count = reaped, "reaped zombie sessions");
            counter!("gateway_sessions_reaped_total").increment(reaped as u64);
        }
        reaped
    }

    /// Graceful drain: shutdown notice to actives, close every session in
    /// both tables, then clear the tables. Returns how many sessions were
    /// disconnected.
    pub async fn disconnect_all(&self) -> usize {
        let (actives, all): (Vec<SessionHandle>, Vec<SessionHandle>) = {
            let tables = self.sessions.read().await;
            let actives = tables.active.values().cloned().collect();
            let all = tables
                .active
                .values()
                .cloned()
                .chain(tables.negotiating.values().map(|entry| entry.handle.clone()))
                .collect();
            (actives, all)
        };

        let shutdown = SystemFrame::server_shutdown();
        for handle in &actives {
            let stamped = shutdown.clone().with_session(handle.session_id());
            let _ = handle.enqueue_text(stamped.to_json());
        }
        let disconnected = all.len();
        for handle in &all {
            handle.enqueue_close(CLOSE_NORMAL, "Server shutdown");
        }

        let mut tables = self.sessions.write().await;
        for (_, negotiating) in tables.negotiating.drain() {
            negotiating.timer.abort();
        }
        tables.active.clear();
        tables.auth.clear();
        tracing::info!(count = disconnected, "disconnected all sessions");
        disconnected
    }
}

/// Negotiation timer: fires once after the configured timeout and expires
/// the session if it never promoted. Promotion aborts this task.
pub fn spawn_negotiation_timer(engine: Arc<Engine>, session_id: String) -> AbortHandle {
    let timeout = engine.config().negotiation_timeout;
    let handle = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        engine.expire_negotiation(&session_id).await;
    });
    handle.abort_handle()
}

/// Periodic liveness sweep over both session tables.
pub fn spawn_zombie_reaper(engine: Arc<Engine>) -> AbortHandle {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(engine.config().reaper_interval);
        // The immediate first tick would race session setup in tests and buys
        // nothing in production.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.reap_zombies().await;
        }
    });
    handle.abort_handle()
}
