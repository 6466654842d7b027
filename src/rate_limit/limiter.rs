use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    RateLimitAlgorithm, RateLimitDecision, RateLimitParams,
    load::{LoadProbe, adaptive_limit},
};
use crate::cache::{
    KvStore, StoreResult,
    keys::{fixed_window_key, rate_limit_key},
    models::TOKEN_EPSILON,
};
use crate::utils::Clock;

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    load: Arc<dyn LoadProbe>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, load: Arc<dyn LoadProbe>) -> Self {
        Self { store, clock, load }
    }

    pub async fn allow(
        &self,
        identifier: &str,
        endpoint: &str,
        algorithm: RateLimitAlgorithm,
        params: &RateLimitParams,
    ) -> bool {
        self.check(identifier, endpoint, algorithm, params)
            .await
            .allowed
    }

    /// Runs one check and records the request when it is admitted.
    pub async fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        algorithm: RateLimitAlgorithm,
        params: &RateLimitParams,
    ) -> RateLimitDecision {
        let result = match algorithm {
            RateLimitAlgorithm::SlidingWindow => {
                let key = rate_limit_key(algorithm.as_str(), identifier, endpoint);
                self.sliding_window(&key, params.max_requests, params.window)
                    .await
            }
            RateLimitAlgorithm::FixedWindow => {
                self.fixed_window(identifier, endpoint, params.max_requests, params.window)
                    .await
            }
            RateLimitAlgorithm::TokenBucket => {
                let key = rate_limit_key(algorithm.as_str(), identifier, endpoint);
                self.token_bucket(&key, params.bucket_size, params.refill_rate)
                    .await
            }
            RateLimitAlgorithm::Adaptive => {
                let load = self.load.load();
                let limit = adaptive_limit(params.max_requests, load);
                debug!(load, limit, "adaptive rate limit");
                let key = rate_limit_key(algorithm.as_str(), identifier, endpoint);
                self.sliding_window(&key, limit, params.window).await
            }
        };

        match result {
            Ok(decision) => {
                if !decision.allowed {
                    debug!(
                        identifier,
                        endpoint,
                        algorithm = %algorithm,
                        "rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                warn!(
                    identifier,
                    endpoint,
                    algorithm = %algorithm,
                    error = %e,
                    "rate limiter store failure, allowing request"
                );
                RateLimitDecision::allowed(params.max_requests, params.max_requests)
            }
        }
    }

    async fn sliding_window(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> StoreResult<RateLimitDecision> {
        let now = self.clock.now();
        let member = format!("{:.6}:{}", now, Uuid::new_v4());
        let admission = self
            .store
            .window_admit(key, &member, now, window, limit as u64)
            .await?;

        if !admission.admitted {
            let oldest = admission.oldest.unwrap_or(now);
            return Ok(RateLimitDecision::rejected(
                limit,
                oldest + window.as_secs_f64() - now,
            ));
        }
        Ok(RateLimitDecision::allowed(
            limit,
            limit.saturating_sub(admission.count as u32),
        ))
    }

    async fn fixed_window(
        &self,
        identifier: &str,
        endpoint: &str,
        limit: u32,
        window: Duration,
    ) -> StoreResult<RateLimitDecision> {
        let now = self.clock.now();
        let window_secs = window.as_secs_f64();
        let index = (now / window_secs).floor() as i64;
        let key = fixed_window_key(identifier, endpoint, index);

        let admission = self.store.counter_admit(&key, limit as u64, window).await?;
        if !admission.admitted {
            let window_end = (index + 1) as f64 * window_secs;
            return Ok(RateLimitDecision::rejected(limit, window_end - now));
        }
        Ok(RateLimitDecision::allowed(
            limit,
            limit.saturating_sub(admission.count as u32),
        ))
    }

    async fn token_bucket(
        &self,
        key: &str,
        bucket_size: u32,
        refill_rate: f64,
    ) -> StoreResult<RateLimitDecision> {
        let now = self.clock.now();
        let capacity = bucket_size as f64;
        let ttl = Duration::from_secs_f64((capacity / refill_rate).max(1.0));

        let take = self
            .store
            .bucket_take(key, now, capacity, refill_rate, ttl)
            .await?;
        if take.admitted {
            Ok(RateLimitDecision::allowed(
                bucket_size,
                (take.tokens + TOKEN_EPSILON).floor() as u32,
            ))
        } else {
            Ok(RateLimitDecision::rejected(
                bucket_size,
                (1.0 - take.tokens) / refill_rate,
            ))
        }
    }
}
