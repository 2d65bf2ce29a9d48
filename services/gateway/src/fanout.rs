//! Fan-out of change events to authorized active sessions.
//!
//! Delivery is at-most-once and best-effort by design: there is no queue, no
//! retry, and no backpressure beyond each session's own outbound buffer. A
//! client that misses events reconciles out of band.

use metrics::counter;
use whagons_wire::ChangeEvent;

use crate::engine::{Engine, SessionHandle};

impl Engine {
    /// Routes one change event to every active session authorized for the
    /// event's tenant. Returns the number of sessions reached.
    pub async fn publish_change(&self, event: &ChangeEvent) -> usize {
        // Snapshot under the read lock; sends happen on the copy.
        let recipients: Vec<SessionHandle> = {
            let tables = self.sessions.read().await;
            tables
                .active
                .iter()
                .filter_map(|(session_id, handle)| {
                    let Some(auth) = tables.auth.get(session_id) else {
                        // Registration binds auth before a session becomes
                        // visible, so this is defensive only.
                        tracing::warn!(session = %session_id, "active session without auth record");
                        return None;
                    };
                    auth.can_access_tenant(&event.tenant_name)
                        .then(|| handle.clone())
                })
                .collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for handle in recipients {
            let publication = event.to_publication(handle.session_id());
            if handle.enqueue_text(publication.to_json()).is_ok() {
                delivered += 1;
            } else {
                failed.push(handle.session_id().to_string());
            }
        }
        if !failed.is_empty() {
            counter!("gateway_publication_send_failures_total").increment(failed.len() as u64);
        }
        self.prune_sessions(&failed).await;

        if delivered > 0 {
            counter!("gateway_publications_delivered_total").increment(delivered as u64);
            tracing::info!(
                tenant = %event.tenant_name,
                table = %event.table,
                operation = %event.op,
                count = delivered,
                "published change event"
            );
        } else {
            tracing::debug!(tenant = %event.tenant_name, "no authorized sessions for change event");
        }
        delivered
    }
}
