use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::abilities::Abilities;
use crate::session::AuthenticatedSession;

/// Default lifetime of a cached validation.
pub const DEFAULT_CACHE_TTL_SECS: i64 = 5 * 60;

/// One memoized successful validation.
///
/// `cache_expires_at` is clamped to the token's own expiry, so a cached entry
/// can never be honored past the point the token itself dies.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub tenant_name: String,
    pub token_id: i64,
    pub subject_id: i64,
    pub abilities: Abilities,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub cache_expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(
        tenant_name: String,
        token_id: i64,
        subject_id: i64,
        abilities: Abilities,
        token_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let mut cache_expires_at = now + ttl;
        if let Some(token_expiry) = token_expires_at {
            cache_expires_at = cache_expires_at.min(token_expiry);
        }
        Self {
            tenant_name,
            token_id,
            subject_id,
            abilities,
            token_expires_at,
            cache_expires_at,
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        if now >= self.cache_expires_at {
            return false;
        }
        match self.token_expires_at {
            Some(expiry) => now < expiry,
            None => true,
        }
    }

    /// Rehydrates the session identity for a fresh connection.
    pub fn to_session(&self, session_id: &str, now: DateTime<Utc>) -> AuthenticatedSession {
        AuthenticatedSession {
            session_id: session_id.to_string(),
            tenant_name: self.tenant_name.clone(),
            subject_id: self.subject_id,
            token_id: self.token_id,
            abilities: self.abilities.clone(),
            token_expires_at: self.token_expires_at,
            last_used_at: now,
        }
    }
}

/// Positive validation cache keyed by `tenant|token_id|sha256hex`.
///
/// Failed lookups are never memoized; a revoked token therefore stops
/// working as soon as its cached success expires.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: DashMap<String, CachedToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(tenant_name: &str, token_id: i64, hashed_secret: &str) -> String {
        format!("{tenant_name}|{token_id}|{hashed_secret}")
    }

    /// Returns a clone of the entry when it is still honorable at `now`.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CachedToken> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.clone())
    }

    pub fn insert(&self, key: String, entry: CachedToken) {
        self.entries.insert(key, entry);
    }

    /// Drops entries past their cache expiry; returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
