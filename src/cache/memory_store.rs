use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::models::TokenBucketState;
use super::store::{Admission, BucketTake, KvStore, StoreError, StoreResult};
use crate::utils::{Clock, SystemClock};

/// Expired entries are swept from the whole map once per this many writes.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Int(i64),
    Sorted(Vec<(f64, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: f64,
}

/// Process-local [`KvStore`] used for `memory://` deployments and tests.
///
/// Expiry follows the injected [`Clock`], so tests can move time forward
/// without sleeping. Keys that are never read again are reclaimed by a
/// periodic sweep on the write path.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    writes: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(AtomicU64::new(0)),
            clock,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts a write and drops every expired entry on each
    /// `SWEEP_EVERY`th one. Called with the map lock held.
    fn after_write(&self, map: &mut HashMap<String, Entry>, now: f64) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            let before = map.len();
            map.retain(|_, e| e.expires_at > now);
            tracing::trace!(removed = before - map.len(), "memory store sweep");
        }
    }

    fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str, now: f64) -> Option<&'a mut Entry> {
        if map.get(key).is_some_and(|e| e.expires_at <= now) {
            map.remove(key);
        }
        map.get_mut(key)
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !candidate.starts_with(first) || candidate.len() < first.len() + last.len() {
        return false;
    }
    if !candidate[first.len()..].ends_with(last) {
        return false;
    }

    let mut rest = &candidate[first.len()..candidate.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let mut map = self.entries.lock();
        match Self::live(&mut map, key, now) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(Entry {
                value: Value::Int(n),
                ..
            }) => Ok(Some(n.to_string())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = self.clock.now();
        let mut map = self.entries.lock();
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: now + ttl.as_secs_f64(),
            },
        );
        self.after_write(&mut map, now);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let removed = self.entries.lock().remove(key);
        Ok(removed.is_some_and(|e| e.expires_at > now))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(k, e)| e.expires_at > now && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_matching(&self, pattern: &str) -> StoreResult<u64> {
        let now = self.clock.now();
        let mut map = self.entries.lock();
        let before = map.len();
        let mut expired = 0u64;
        map.retain(|k, e| {
            let matched = glob_match(pattern, k);
            if matched && e.expires_at <= now {
                expired += 1;
            }
            !matched
        });
        Ok((before - map.len()) as u64 - expired)
    }

    async fn counter_admit(&self, key: &str, limit: u64, ttl: Duration) -> StoreResult<Admission> {
        let now = self.clock.now();
        let mut map = self.entries.lock();
        let current = match Self::live(&mut map, key, now) {
            Some(Entry {
                value: Value::Int(n),
                ..
            }) => *n,
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => s
                .parse::<i64>()
                .map_err(|_| StoreError::WrongType(key.to_string()))?,
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
            None => 0,
        };
        let current = current.max(0) as u64;
        if current >= limit {
            return Ok(Admission {
                admitted: false,
                count: current,
                oldest: None,
            });
        }

        let count = current + 1;
        match Self::live(&mut map, key, now) {
            Some(entry) => entry.value = Value::Int(count as i64),
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Int(count as i64),
                        expires_at: now + ttl.as_secs_f64(),
                    },
                );
            }
        }
        self.after_write(&mut map, now);
        Ok(Admission {
            admitted: true,
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
        let clock_now = self.clock.now();
        let window_start = now - window.as_secs_f64();
        let expires_at = clock_now + window.as_secs_f64();
        let mut map = self.entries.lock();

        let admission = match Self::live(&mut map, key, clock_now) {
            Some(Entry {
                value: Value::Sorted(members),
                expires_at: exp,
            }) => {
                members.retain(|(score, _)| *score >= window_start);
                let count = members.len() as u64;
                if count >= limit {
                    return Ok(Admission {
                        admitted: false,
                        count,
                        oldest: members.first().map(|(score, _)| *score),
                    });
                }
                members.retain(|(_, m)| m != member);
                let idx = members.partition_point(|(s, _)| *s <= now);
                members.insert(idx, (now, member.to_string()));
                *exp = expires_at;
                Admission {
                    admitted: true,
                    count: members.len() as u64,
                    oldest: None,
                }
            }
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
            None if limit == 0 => {
                return Ok(Admission {
                    admitted: false,
                    count: 0,
                    oldest: None,
                });
            }
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Sorted(vec![(now, member.to_string())]),
                        expires_at,
                    },
                );
                Admission {
                    admitted: true,
                    count: 1,
                    oldest: None,
                }
            }
        };
        self.after_write(&mut map, clock_now);
        Ok(admission)
    }

    async fn bucket_take(
        &self,
        key: &str,
        now: f64,
        capacity: f64,
        refill_rate: f64,
        ttl: Duration,
    ) -> StoreResult<BucketTake> {
        let clock_now = self.clock.now();
        let mut map = self.entries.lock();

        let mut state = match Self::live(&mut map, key, clock_now) {
            Some(Entry {
                value: Value::Str(json),
                ..
            }) => serde_json::from_str::<TokenBucketState>(json)?,
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
            None => TokenBucketState::full(capacity, now),
        };
        state.refill(now, refill_rate, capacity);
        let admitted = state.take();

        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(serde_json::to_string(&state)?),
                expires_at: clock_now + ttl.as_secs_f64(),
            },
        );
        self.after_write(&mut map, clock_now);
        Ok(BucketTake {
            admitted,
            tokens: state.tokens,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(1_000.0);
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("jwt:user:42:*", "jwt:user:42:abc"));
        assert!(!glob_match("jwt:user:42:*", "jwt:user:421:abc"));
        assert!(glob_match("*:token:*", "auth:token:x"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("a*b*c", "a-b-b-c"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[tokio::test]
    async fn values_expire_with_the_clock() {
        let (store, clock) = store();
        store
            .set_ex("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn counter_stops_at_limit_and_keeps_first_ttl() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(5);
        assert_eq!(store.counter_admit("c", 2, ttl).await.unwrap().count, 1);
        clock.advance(Duration::from_secs(3));
        assert!(store.counter_admit("c", 2, ttl).await.unwrap().admitted);

        let rejected = store.counter_admit("c", 2, ttl).await.unwrap();
        assert!(!rejected.admitted);
        assert_eq!(rejected.count, 2);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("2"));

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.counter_admit("c", 2, ttl).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn window_prunes_old_scores_and_reports_oldest() {
        let (store, _) = store();
        let window = Duration::from_secs(10);
        for (member, at) in [("a", 10.0), ("b", 12.0), ("c", 15.0)] {
            assert!(store.window_admit("w", member, at, window, 3).await.unwrap().admitted);
        }

        let full = store.window_admit("w", "d", 19.0, window, 3).await.unwrap();
        assert!(!full.admitted);
        assert_eq!(full.count, 3);
        assert_eq!(full.oldest, Some(10.0));

        // At t=21 the member scored 10 has left the window.
        let next = store.window_admit("w", "e", 21.0, window, 3).await.unwrap();
        assert!(next.admitted);
        assert_eq!(next.count, 3);
    }

    #[tokio::test]
    async fn bucket_is_stored_as_json() {
        let (store, _) = store();
        let ttl = Duration::from_secs(60);
        let take = store.bucket_take("b", 100.0, 2.0, 1.0, ttl).await.unwrap();
        assert!(take.admitted);
        assert_eq!(take.tokens, 1.0);

        let state: TokenBucketState =
            serde_json::from_str(&store.get("b").await.unwrap().unwrap()).unwrap();
        assert_eq!(state, TokenBucketState { tokens: 1.0, last_refill: 100.0 });

        assert!(store.bucket_take("b", 100.0, 2.0, 1.0, ttl).await.unwrap().admitted);
        assert!(!store.bucket_take("b", 100.5, 2.0, 1.0, ttl).await.unwrap().admitted);
        assert!(store.bucket_take("b", 101.0, 2.0, 1.0, ttl).await.unwrap().admitted);
    }

    #[tokio::test]
    async fn expired_entries_are_swept_without_being_read() {
        let (store, clock) = store();
        for i in 0..(SWEEP_EVERY * 4) {
            store
                .counter_admit(&format!("window:{i}"), 10, Duration::from_secs(1))
                .await
                .unwrap();
            clock.advance(Duration::from_secs(2));
        }
        assert!(store.is_empty());
        assert!(store.entries.lock().len() <= SWEEP_EVERY as usize);
    }

    #[tokio::test]
    async fn pattern_operations() {
        let (store, _) = store();
        let ttl = Duration::from_secs(60);
        store.set_ex("jwt:user:1:a", "1", ttl).await.unwrap();
        store.set_ex("jwt:user:1:b", "1", ttl).await.unwrap();
        store.set_ex("jwt:user:2:a", "1", ttl).await.unwrap();

        assert_eq!(
            store.keys("jwt:user:1:*").await.unwrap(),
            vec!["jwt:user:1:a".to_string(), "jwt:user:1:b".to_string()]
        );
        assert_eq!(store.delete_matching("jwt:user:1:*").await.unwrap(), 2);
        assert_eq!(store.keys("jwt:user:*").await.unwrap().len(), 1);
        assert!(store.delete("jwt:user:2:a").await.unwrap());
        assert!(!store.delete("jwt:user:2:a").await.unwrap());
    }
}
