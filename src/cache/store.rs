use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store command failed: {0}")]
    Command(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("key {0} holds a value of the wrong type")]
    WrongType(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a check-and-record against a limit, decided in one store call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    pub admitted: bool,
    /// Entries counted against the limit once this call is done.
    pub count: u64,
    /// Oldest score still in a sliding window; set only on rejection.
    pub oldest: Option<f64>,
}

/// Outcome of one token-bucket draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketTake {
    pub admitted: bool,
    /// Tokens left after the draw.
    pub tokens: f64,
}

/// Shared key-value store behind the rate limiter, token cache and blacklist.
///
/// Patterns accepted by [`KvStore::keys`] and [`KvStore::delete_matching`]
/// only support the `*` wildcard. The three limiter operations decide and
/// record atomically, so concurrent callers cannot all pass the same check.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn delete_matching(&self, pattern: &str) -> StoreResult<u64>;

    /// Increments a counter only while it is below `limit`. The TTL is
    /// applied when the increment creates the key.
    async fn counter_admit(&self, key: &str, limit: u64, ttl: Duration) -> StoreResult<Admission>;

    /// Drops sorted-set members scored below `now - window`, then adds
    /// `member` at `now` if fewer than `limit` remain. The key lives for
    /// `window` after each admission.
    async fn window_admit(
        &self,
        key: &str,
        member: &str,
        now: f64,
        window: Duration,
        limit: u64,
    ) -> StoreResult<Admission>;

    /// Refills the bucket at `key` for the time elapsed up to `now` (a new
    /// bucket starts full) and takes one token if available.
    async fn bucket_take(
        &self,
        key: &str,
        now: f64,
        capacity: f64,
        refill_rate: f64,
        ttl: Duration,
    ) -> StoreResult<BucketTake>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Whole seconds for a store TTL, never zero.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs_f64().ceil().max(1.0) as u64
}
