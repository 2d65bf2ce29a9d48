//! Bearer-token validation against the tenant's token store.
//!
//! The personal access token table is read-only for the gateway except for
//! the best-effort `last_used_at` touch on successful validation. Successful
//! validations are memoized in the engine's positive cache; failures never
//! are, so revocation takes effect as soon as the cached success expires.

use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::counter;
use sqlx::FromRow;
use std::sync::Arc;
use tokio::task::AbortHandle;
use whagons_authz::{
    Abilities, AuthError, AuthResult, AuthenticatedSession, BearerCredentials, CachedToken,
    TokenCache,
};

use crate::engine::Engine;

const TOKEN_QUERY: &str = "SELECT id, tokenable_type, tokenable_id, name, token, abilities, \
     last_used_at, expires_at, created_at, updated_at \
     FROM personal_access_tokens \
     WHERE id = $1 AND token = $2";

/// Columns the validator actually consumes; the row carries more (see
/// `TOKEN_QUERY`) but the rest is schema ballast.
#[derive(Debug, FromRow)]
struct TokenRow {
    id: i64,
    tokenable_id: i64,
    abilities: String,
    expires_at: Option<NaiveDateTime>,
}

impl Engine {
    /// Validates `bearer` for the tenant owning `domain` and returns the
    /// authenticated identity. The returned session's `session_id` is empty;
    /// the connection handshake stamps it.
    pub async fn authenticate(&self, bearer: &str, domain: &str) -> AuthResult<AuthenticatedSession> {
        let credentials = BearerCredentials::parse(bearer)?;
        let hashed = credentials.hashed_secret();

        let tenant = match self.resolve_by_domain(domain).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                counter!("gateway_auth_failures_total", "kind" => "tenant_not_found").increment(1);
                return Err(AuthError::TenantNotFound(domain.to_string()));
            }
            Err(err) => {
                tracing::warn!(domain = %domain, error = %err, "landlord lookup failed");
                counter!("gateway_auth_failures_total", "kind" => "landlord").increment(1);
                return Err(AuthError::TenantUnreachable(domain.to_string()));
            }
        };

        let now = Utc::now();
        let cache_key = TokenCache::key(&tenant.name, credentials.token_id, &hashed);
        if let Some(cached) = self.token_cache.get(&cache_key, now) {
            tracing::debug!(tenant = %tenant.name, token_id = credentials.token_id, "token cache hit");
            counter!("gateway_auth_cache_hits_total").increment(1);
            return Ok(cached.to_session("", now));
        }

        let Some(pool) = self.connection_for(&tenant.name).await else {
            counter!("gateway_auth_failures_total", "kind" => "tenant_unreachable").increment(1);
            return Err(AuthError::TenantUnreachable(tenant.name.clone()));
        };

        let row = sqlx::query_as::<_, TokenRow>(TOKEN_QUERY)
            .bind(credentials.token_id)
            .bind(&hashed)
            .fetch_optional(&pool)
            .await
            .map_err(|err| {
                tracing::warn!(tenant = %tenant.name, error = %err, "token lookup failed");
                AuthError::TenantUnreachable(tenant.name.clone())
            })?;
        let Some(row) = row else {
            counter!("gateway_auth_failures_total", "kind" => "invalid_token").increment(1);
            return Err(AuthError::InvalidToken(tenant.name.clone()));
        };

        let expires_at = row
            .expires_at
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        if let Some(expiry) = expires_at
            && expiry <= now
        {
            // Expired tokens are rejected and deliberately NOT cached.
            counter!("gateway_auth_failures_total", "kind" => "expired").increment(1);
            return Err(AuthError::Expired);
        }

        // Best-effort usage touch; a failure is logged, never fatal.
        if let Err(err) = sqlx::query("UPDATE personal_access_tokens SET last_used_at = $1 WHERE id = $2")
            .bind(now.naive_utc())
            .bind(row.id)
            .execute(&pool)
            .await
        {
            tracing::warn!(tenant = %tenant.name, token_id = row.id, error = %err, "failed to update last_used_at");
        }

        let abilities = match Abilities::from_json(&row.abilities) {
            Ok(abilities) => abilities,
            Err(err) => {
                // Undecodable abilities grant nothing rather than everything.
                tracing::warn!(tenant = %tenant.name, token_id = row.id, error = %err, "unparseable abilities column");
                Abilities::default()
            }
        };

        let ttl = chrono::Duration::from_std(self.config().cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(whagons_authz::DEFAULT_CACHE_TTL_SECS));
        let cached = CachedToken::new(
            tenant.name.clone(),
            row.id,
            row.tokenable_id,
            abilities,
            expires_at,
            now,
            ttl,
        );
        let session = cached.to_session("", now);
        self.token_cache.insert(cache_key, cached);

        counter!("gateway_auth_success_total").increment(1);
        tracing::info!(
            tenant = %tenant.name,
            subject = session.subject_id,
            token_id = session.token_id,
            "token authenticated"
        );
        Ok(session)
    }
}

/// Periodic sweep of expired cache entries; the cadence matches the TTL.
pub fn spawn_cache_sweeper(engine: Arc<Engine>) -> AbortHandle {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(engine.config().cache_ttl);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = engine.token_cache().sweep(Utc::now());
            if removed > 0 {
                tracing::debug!(count = removed, "swept expired token cache entries");
            }
        }
    });
    handle.abort_handle()
}
