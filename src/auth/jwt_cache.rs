//! Memoized token validation.
//!
//! Verdicts live under a SHA-256 of the raw token for at most the token's
//! remaining lifetime, capped by a configured default. A per-user index lets
//! logout-everywhere evict all of one user's entries. If the store misbehaves,
//! validation goes straight to the verifier.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{AuthError, Claims, TokenVerifier};
use crate::cache::{
    KvStore, StoreResult, get_json,
    keys::{jwt_cache_key, jwt_user_index_key, jwt_user_index_pattern},
    models::CachedTokenValidation,
    set_json_ex,
};
use crate::utils::{Clock, hash_token};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct JwtCacheService {
    store: Arc<dyn KvStore>,
    verifier: Arc<dyn TokenVerifier>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl JwtCacheService {
    pub fn new(
        store: Arc<dyn KvStore>,
        verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            store,
            verifier,
            clock,
            default_ttl,
        }
    }

    pub async fn validate_token_cached(&self, token: &str) -> Result<Claims, AuthError> {
        let token_hash = hash_token(token);
        let key = jwt_cache_key(&token_hash);

        match get_json::<CachedTokenValidation>(self.store.as_ref(), &key).await {
            Ok(Some(cached)) if cached.valid && (cached.expires_at as f64) > self.clock.now() => {
                debug!(user_id = %cached.payload.sub, "jwt cache hit");
                return Ok(cached.payload);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "jwt cache read failed, validating directly");
                return self.verifier.verify(token);
            }
        }

        let claims = self.verifier.verify(token)?;
        if let Err(e) = self.store_verdict(&token_hash, &claims).await {
            warn!(error = %e, user_id = %claims.sub, "jwt cache write failed");
        }
        Ok(claims)
    }

    async fn store_verdict(&self, token_hash: &str, claims: &Claims) -> StoreResult<()> {
        let remaining = claims.exp as f64 - self.clock.now();
        if remaining <= 0.0 {
            return Ok(());
        }
        let ttl = Duration::from_secs_f64(remaining).min(self.default_ttl);

        let entry = CachedTokenValidation {
            valid: true,
            payload: claims.clone(),
            expires_at: claims.exp,
        };
        set_json_ex(self.store.as_ref(), &jwt_cache_key(token_hash), &entry, ttl).await?;
        self.store
            .set_ex(&jwt_user_index_key(&claims.sub, token_hash), "1", ttl)
            .await?;
        debug!(user_id = %claims.sub, ttl_secs = ttl.as_secs(), "jwt verdict cached");
        Ok(())
    }

    /// Drops the cached verdict for one token. Returns whether one existed.
    pub async fn invalidate_token(&self, token: &str) -> StoreResult<bool> {
        let token_hash = hash_token(token);
        let key = jwt_cache_key(&token_hash);
        if let Some(cached) = get_json::<CachedTokenValidation>(self.store.as_ref(), &key).await? {
            self.store
                .delete(&jwt_user_index_key(&cached.payload.sub, &token_hash))
                .await?;
        }
        self.store.delete(&key).await
    }

    /// Drops every cached verdict belonging to `user_id`. Returns how many
    /// verdicts were removed.
    pub async fn invalidate_user(&self, user_id: &str) -> StoreResult<u64> {
        let pattern = jwt_user_index_pattern(user_id);
        let mut removed = 0;
        for index_key in self.store.keys(&pattern).await? {
            if let Some(token_hash) = index_key.rsplit(':').next() {
                if self.store.delete(&jwt_cache_key(token_hash)).await? {
                    removed += 1;
                }
            }
        }
        self.store.delete_matching(&pattern).await?;
        debug!(user_id, removed, "jwt cache entries invalidated");
        Ok(removed)
    }
}
