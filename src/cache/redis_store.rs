use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, Script, aio::MultiplexedConnection};
use tokio::sync::OnceCell;

use super::models::TOKEN_EPSILON;
use super::store::{Admission, BucketTake, KvStore, StoreError, StoreResult, ttl_secs};

/// Keys fetched per SCAN round trip and deleted per DEL.
const SCAN_BATCH: usize = 500;

/// KEYS[1] counter; ARGV limit, ttl. Returns {admitted, count}.
static COUNTER_ADMIT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local current = tonumber(redis.call('GET', KEYS[1]) or '0')
        if current >= tonumber(ARGV[1]) then
            return {0, current}
        end
        current = redis.call('INCR', KEYS[1])
        if current == 1 then
            redis.call('EXPIRE', KEYS[1], ARGV[2])
        end
        return {1, current}
        "#,
    )
});

/// KEYS[1] sorted set; ARGV window_start, limit, now, member, ttl.
/// Returns {admitted, count, oldest score or ''}.
static WINDOW_ADMIT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
        local count = redis.call('ZCARD', KEYS[1])
        if count >= tonumber(ARGV[2]) then
            local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
            return {0, count, oldest[2] or ''}
        end
        redis.call('ZADD', KEYS[1], ARGV[3], ARGV[4])
        redis.call('EXPIRE', KEYS[1], ARGV[5])
        return {1, count + 1, ''}
        "#,
    )
});

/// KEYS[1] JSON `{tokens, last_refill}`; ARGV now, capacity, refill_rate,
/// ttl, epsilon. Returns {admitted, tokens}.
static BUCKET_TAKE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local now = tonumber(ARGV[1])
        local capacity = tonumber(ARGV[2])
        local rate = tonumber(ARGV[3])
        local tokens = capacity
        local last = now
        local raw = redis.call('GET', KEYS[1])
        if raw then
            local state = cjson.decode(raw)
            tokens = tonumber(state.tokens)
            last = tonumber(state.last_refill)
        end
        local elapsed = math.max(now - last, 0)
        tokens = math.min(tokens + elapsed * rate, capacity)
        local admitted = 0
        if tokens + tonumber(ARGV[5]) >= 1 then
            tokens = math.max(tokens - 1, 0)
            admitted = 1
        end
        redis.call('SET', KEYS[1], cjson.encode({tokens = tokens, last_refill = now}), 'EX', ARGV[4])
        return {admitted, tostring(tokens)}
        "#,
    )
});

/// [`KvStore`] over a Redis-compatible server.
///
/// The multiplexed connection is opened on first use and shared by every
/// caller afterwards.
pub struct RedisStore {
    client: RedisClient,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisStore {
    pub fn open(url: &str) -> StoreResult<Self> {
        let client =
            RedisClient::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::debug!("opening redis multiplexed connection");
                self.client.get_multiplexed_async_connection().await
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        scan_keys(&mut conn, pattern).await
    }

    async fn delete_matching(&self, pattern: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let keys = scan_keys(&mut conn, pattern).await?;
        let mut removed = 0u64;
        for batch in keys.chunks(SCAN_BATCH) {
            let n: u64 = conn.del(batch).await?;
            removed += n;
        }
        Ok(removed)
    }

    async fn counter_admit(&self, key: &str, limit: u64, ttl: Duration) -> StoreResult<Admission> {
        let mut conn = self.conn().await?;
        let (admitted, count): (i64, u64) = COUNTER_ADMIT
            .key(key)
            .arg(limit)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(Admission {
            admitted: admitted == 1,
            count,
            oldest: None,
        })
    }

    async fn window_admit(
        &self,
        key: &str,
        member: &str,
        now: f64,
        window: Duration,
        limit: u64,
    ) -> StoreResult<Admission> {
        let mut conn = self.conn().await?;
        let (admitted, count, oldest): (i64, u64, String) = WINDOW_ADMIT
            .key(key)
            .arg(now - window.as_secs_f64())
            .arg(limit)
            .arg(now)
            .arg(member)
            .arg(ttl_secs(window))
            .invoke_async(&mut conn)
            .await?;
        let oldest = if oldest.is_empty() {
            None
        } else {
            Some(parse_float(&oldest)?)
        };
        Ok(Admission {
            admitted: admitted == 1,
            count,
            oldest,
        })
    }

    async fn bucket_take(
        &self,
        key: &str,
        now: f64,
        capacity: f64,
        refill_rate: f64,
        ttl: Duration,
    ) -> StoreResult<BucketTake> {
        let mut conn = self.conn().await?;
        let (admitted, tokens): (i64, String) = BUCKET_TAKE
            .key(key)
            .arg(now)
            .arg(capacity)
            .arg(refill_rate)
            .arg(ttl_secs(ttl))
            .arg(TOKEN_EPSILON)
            .invoke_async(&mut conn)
            .await?;
        Ok(BucketTake {
            admitted: admitted == 1,
            tokens: parse_float(&tokens)?,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Cursor-based key listing; never blocks the server the way KEYS does.
async fn scan_keys(conn: &mut MultiplexedConnection, pattern: &str) -> StoreResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    // SCAN may return a key more than once
    keys.sort();
    keys.dedup();
    Ok(keys)
}

fn parse_float(raw: &str) -> StoreResult<f64> {
    raw.parse()
        .map_err(|_| StoreError::Command(format!("expected a number, got {raw:?}")))
}
