use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::abilities::Abilities;

/// Authenticated identity bound to a connected session.
///
/// Exists for every registered session, negotiating or active; sessions are
/// looked up by id, the identity never owns the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub session_id: String,
    pub tenant_name: String,
    pub subject_id: i64,
    pub token_id: i64,
    pub abilities: Abilities,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_used_at: DateTime<Utc>,
}

impl AuthenticatedSession {
    /// Tenant access is strict equality; there is no cross-tenant grant.
    pub fn can_access_tenant(&self, tenant_name: &str) -> bool {
        self.tenant_name == tenant_name
    }

    pub fn has_ability(&self, required: &str) -> bool {
        self.abilities.allows(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(tenant: &str) -> AuthenticatedSession {
        AuthenticatedSession {
            session_id: "s1".to_string(),
            tenant_name: tenant.to_string(),
            subject_id: 42,
            token_id: 7,
            abilities: Abilities::wildcard(),
            token_expires_at: None,
            last_used_at: Utc::now(),
        }
    }

    #[test]
    fn tenant_access_is_exact() {
        let auth = session("acme");
        assert!(auth.can_access_tenant("acme"));
        assert!(!auth.can_access_tenant("globex"));
        assert!(!auth.can_access_tenant("Acme"));
    }

    #[test]
    fn ability_check_delegates_to_abilities() {
        let auth = session("acme");
        assert!(auth.has_ability("tasks:read"));
    }
}
