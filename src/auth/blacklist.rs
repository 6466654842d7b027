//! Token revocation backed by the shared store.
//!
//! Single tokens are revoked by `jti` until they would have expired anyway.
//! Revoking a user records a timestamp; any of that user's tokens issued at or
//! before it are rejected.

use std::sync::Arc;
use std::time::Duration;

use super::Claims;
use crate::cache::{
    KvStore, StoreResult,
    keys::{blacklist_token_key, blacklist_user_key},
};
use crate::utils::Clock;

#[derive(Clone)]
pub struct TokenBlacklist {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl TokenBlacklist {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn now_secs(&self) -> i64 {
        self.clock.now().floor() as i64
    }

    /// Time left before `claims` expire on their own, at least one second.
    pub fn remaining_lifetime(&self, claims: &Claims) -> Duration {
        Duration::from_secs((claims.exp - self.now_secs()).max(1) as u64)
    }

    pub async fn blacklist_token(&self, jti: &str, ttl: Duration) -> StoreResult<()> {
        self.store
            .set_ex(&blacklist_token_key(jti), &self.now_secs().to_string(), ttl)
            .await?;
        tracing::debug!(jti, "token added to blacklist");
        Ok(())
    }

    pub async fn is_blacklisted(&self, jti: &str) -> StoreResult<bool> {
        Ok(self.store.get(&blacklist_token_key(jti)).await?.is_some())
    }

    pub async fn revoke_all_user_tokens(&self, user_id: &str, ttl: Duration) -> StoreResult<()> {
        self.store
            .set_ex(&blacklist_user_key(user_id), &self.now_secs().to_string(), ttl)
            .await?;
        tracing::info!(user_id, "all user tokens revoked");
        Ok(())
    }

    pub async fn are_user_tokens_revoked(&self, user_id: &str, token_iat: i64) -> StoreResult<bool> {
        let revoked_at = self.store.get(&blacklist_user_key(user_id)).await?;
        Ok(revoked_at
            .and_then(|v| v.parse::<i64>().ok())
            .is_some_and(|revoked_at| token_iat <= revoked_at))
    }

    /// Combined check used on every authenticated request. Store failures
    /// are logged and treated as "not revoked".
    pub async fn is_revoked(&self, claims: &Claims) -> bool {
        let token = self
            .is_blacklisted(&claims.jti)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, jti = %claims.jti, "blacklist lookup failed, allowing token");
                false
            });
        let user = self
            .are_user_tokens_revoked(&claims.sub, claims.iat)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, user_id = %claims.sub, "user revocation lookup failed, allowing token");
                false
            });
        token || user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::utils::ManualClock;

    fn blacklist() -> (TokenBlacklist, ManualClock) {
        let clock = ManualClock::new(1_000.0);
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        (
            TokenBlacklist::new(Arc::new(store), Arc::new(clock.clone())),
            clock,
        )
    }

    fn claims(sub: &str, jti: &str, iat: i64) -> Claims {
        Claims {
            sub: sub.into(),
            exp: iat + 600,
            iat,
            jti: jti.into(),
        }
    }

    #[tokio::test]
    async fn blacklisted_jti_expires_with_ttl() {
        let (bl, clock) = blacklist();
        bl.blacklist_token("abc", Duration::from_secs(60)).await.unwrap();
        assert!(bl.is_blacklisted("abc").await.unwrap());
        assert!(!bl.is_blacklisted("other").await.unwrap());

        clock.advance(Duration::from_secs(60));
        assert!(!bl.is_blacklisted("abc").await.unwrap());
    }

    #[tokio::test]
    async fn user_revocation_covers_earlier_tokens_only() {
        let (bl, clock) = blacklist();
        bl.revoke_all_user_tokens("u1", Duration::from_secs(600))
            .await
            .unwrap();

        assert!(bl.are_user_tokens_revoked("u1", 990).await.unwrap());
        assert!(bl.are_user_tokens_revoked("u1", 1_000).await.unwrap());
        assert!(!bl.are_user_tokens_revoked("u1", 1_001).await.unwrap());
        assert!(!bl.are_user_tokens_revoked("u2", 990).await.unwrap());

        clock.advance(Duration::from_secs(5));
        assert!(!bl.is_revoked(&claims("u1", "fresh", 1_005)).await);
        assert!(bl.is_revoked(&claims("u1", "old", 999)).await);
    }

    #[tokio::test]
    async fn is_revoked_checks_jti() {
        let (bl, _) = blacklist();
        let c = claims("u1", "j1", 1_000);
        assert!(!bl.is_revoked(&c).await);
        bl.blacklist_token("j1", bl.remaining_lifetime(&c)).await.unwrap();
        assert!(bl.is_revoked(&c).await);
    }

    #[test]
    fn remaining_lifetime_is_at_least_one_second() {
        let (bl, _) = blacklist();
        assert_eq!(
            bl.remaining_lifetime(&claims("u", "j", 900)),
            Duration::from_secs(500)
        );
        assert_eq!(
            bl.remaining_lifetime(&claims("u", "j", 0)),
            Duration::from_secs(1)
        );
    }
}
