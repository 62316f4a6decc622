//! The session store: opaque tokens, TTL refresh, sweeping.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use portal_db::DbHandle;
use portal_db::entities::session;
use portal_db::repos;
use portal_security::{AccessScope, Identity};

use crate::config::AuthConfig;
use crate::domain::DomainError;

/// Longest token the store will even look up; anything else is noise.
const MAX_TOKEN_LEN: usize = 128;

/// Result of a lookup. `Expired` exists so the API can tell the caller to
/// log in again; unauthenticated callers still only ever learn "not found".
#[derive(Debug)]
pub enum SessionLookup {
    Found(session::Model),
    Expired,
    NotFound,
}

pub struct SessionService {
    db: DbHandle,
    cfg: AuthConfig,
}

impl SessionService {
    #[must_use]
    pub fn new(db: DbHandle, cfg: AuthConfig) -> Self {
        Self { db, cfg }
    }

    /// Create a session for an authenticated identity. Enforces the
    /// per-user cap by evicting the oldest session.
    #[instrument(skip_all, fields(user_id = %identity.id))]
    pub async fn create(
        &self,
        identity: &Identity,
        remote_addr: Option<String>,
        user_agent: Option<String>,
    ) -> Result<session::Model, DomainError> {
        if let Some(cap) = self.cfg.max_sessions_per_user {
            let count = repos::sessions::count_by_user(self.db.conn(), identity.id).await?;
            if count >= cap {
                repos::sessions::delete_oldest(self.db.conn(), identity.id).await?;
                debug!("session cap reached, evicted oldest session");
            }
        }

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.cfg.session_ttl)
            .map_err(|e| DomainError::Internal(e.to_string()))?;
        let model = session::Model {
            id: generate_token(),
            user_id: identity.id,
            tenant_id: identity.tenant_id,
            created_at: now,
            expires_at: now + ttl,
            last_activity: now,
            remote_addr,
            user_agent,
            active: true,
            metadata: serde_json::json!({}),
        };
        let created = repos::sessions::insert(self.db.conn(), model).await?;
        info!(session_created_at = %created.created_at, "session created");
        Ok(created)
    }

    /// Side-effect-free lookup.
    pub async fn get(&self, token: &str) -> Result<SessionLookup, DomainError> {
        if !plausible_token(token) {
            return Ok(SessionLookup::NotFound);
        }
        match repos::sessions::get(self.db.conn(), token).await? {
            None => Ok(SessionLookup::NotFound),
            Some(model) if !model.active => Ok(SessionLookup::NotFound),
            Some(model) if model.expires_at <= Utc::now() => Ok(SessionLookup::Expired),
            Some(model) => Ok(SessionLookup::Found(model)),
        }
    }

    /// Extend the session by the configured TTL. The expiry never moves
    /// backwards.
    pub async fn refresh(&self, token: &str) -> Result<Option<session::Model>, DomainError> {
        if !plausible_token(token) {
            return Ok(None);
        }
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.cfg.session_ttl)
            .map_err(|e| DomainError::Internal(e.to_string()))?;
        Ok(repos::sessions::refresh(self.db.conn(), token, now + ttl, now).await?)
    }

    /// Revoke one session. Users can only revoke their own; tenant admins
    /// any session of their tenant.
    pub async fn delete(&self, scope: &AccessScope, token: &str) -> Result<bool, DomainError> {
        if !plausible_token(token) {
            return Ok(false);
        }
        let Some(existing) = repos::sessions::get(self.db.conn(), token).await? else {
            return Ok(false);
        };
        if !may_touch(scope, &existing) {
            // Not visible through this scope: indistinguishable from absent.
            return Ok(false);
        }
        Ok(repos::sessions::delete(self.db.conn(), token).await?)
    }

    pub async fn list_by_user(
        &self,
        scope: &AccessScope,
        user_id: Uuid,
    ) -> Result<Vec<session::Model>, DomainError> {
        if user_id != scope.user_id() && !scope.sees_whole_tenant() {
            return Err(DomainError::NotFound("session"));
        }
        let sessions = repos::sessions::list_by_user(self.db.conn(), user_id).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| scope.sees_all_tenants() || s.tenant_id == scope.tenant_id())
            .collect())
    }

    /// Bulk revocation for one user.
    pub async fn delete_by_user(
        &self,
        scope: &AccessScope,
        user_id: Uuid,
    ) -> Result<u64, DomainError> {
        if user_id != scope.user_id() && !scope.sees_whole_tenant() {
            return Err(DomainError::NotFound("session"));
        }
        Ok(repos::sessions::delete_by_user(self.db.conn(), user_id).await?)
    }

    /// One sweep pass; idempotent and safe under concurrency.
    pub async fn sweep_expired(&self) -> Result<u64, DomainError> {
        Ok(repos::sessions::delete_expired(self.db.conn(), Utc::now()).await?)
    }

    /// Cooperative background sweeper.
    pub fn spawn_sweeper(self: std::sync::Arc<Self>, cancel: CancellationToken) {
        let service = self;
        let interval = service.cfg.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("session sweeper stopped");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {
                        match service.sweep_expired().await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "expired sessions swept"),
                            Err(e) => tracing::warn!(error = %e, "session sweep failed"),
                        }
                    }
                }
            }
        });
    }
}

fn may_touch(scope: &AccessScope, session: &session::Model) -> bool {
    if session.user_id == scope.user_id() {
        return true;
    }
    if scope.sees_all_tenants() {
        return true;
    }
    scope.sees_whole_tenant() && session.tenant_id == scope.tenant_id()
}

/// 256 bits of randomness, URL-safe. Unguessable by construction.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Cheap shape check before hitting the store. Anything failing it is
/// treated as not found, leaking nothing.
fn plausible_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(plausible_token(&a));
        // 32 bytes base64url without padding.
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn implausible_tokens_are_rejected_up_front() {
        assert!(!plausible_token(""));
        assert!(!plausible_token("has space"));
        assert!(!plausible_token("semi;colon"));
        assert!(!plausible_token(&"x".repeat(200)));
        assert!(plausible_token("A-Za-z0-9_-ok"));
    }
}
