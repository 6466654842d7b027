// Shared key-value store: trait, backends, key builders and cached records.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

pub mod keys;
pub mod memory_store;
pub mod models;
pub mod redis_store;
pub mod store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{Admission, BucketTake, KvStore, StoreError, StoreResult};

/// Opens the backend named by the URL scheme: `memory://` or a Redis URL.
pub fn open_store(url: &str) -> StoreResult<Arc<dyn KvStore>> {
    if url.starts_with("memory://") {
        tracing::warn!("using in-process memory store; limits are not shared between workers");
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Ok(Arc::new(RedisStore::open(url)?))
    }
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub async fn set_json_ex<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> StoreResult<()> {
    let json = serde_json::to_string(value)?;
    store.set_ex(key, &json, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::models::TokenBucketState;

    #[tokio::test]
    async fn json_round_trip_through_store() {
        let store = MemoryStore::new();
        let state = TokenBucketState::full(3.0, 12.5);
        set_json_ex(&store, "bucket", &state, Duration::from_secs(30))
            .await
            .unwrap();

        let loaded: Option<TokenBucketState> = get_json(&store, "bucket").await.unwrap();
        assert_eq!(loaded, Some(state));
        assert!(
            get_json::<TokenBucketState>(&store, "missing")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn malformed_json_is_a_serialization_error() {
        let store = MemoryStore::new();
        store
            .set_ex("bucket", "not json", Duration::from_secs(30))
            .await
            .unwrap();
        let result = get_json::<TokenBucketState>(&store, "bucket").await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[test]
    fn memory_scheme_opens_memory_store() {
        assert!(open_store("memory://").is_ok());
        assert!(open_store("redis://127.0.0.1:6379").is_ok());
    }
}
