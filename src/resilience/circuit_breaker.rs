//! Circuit breaker guarding downstream integrations.
//!
//! ```text
//! ┌────────┐  failure_threshold  ┌──────┐  recovery_timeout  ┌──────────┐
//! │ Closed │ ──────reached─────→ │ Open │ ────elapsed─────→  │ HalfOpen │
//! └────────┘                     └──────┘ ←──trial fails──── └──────────┘
//!      ↑                                                          │
//!      └───────────────────── trial succeeds ─────────────────────┘
//! ```
//!
//! State is per process. Workers behind a load balancer each keep their own
//! breaker and may disagree about a dependency's health.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// One trial call is in flight.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Thread-safe breaker; clones share state. No I/O happens under the lock.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_started: None,
            })),
        }
    }

    /// Whether a call may proceed now.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// and admits exactly one trial. While that trial is outstanding further
    /// calls are rejected; a trial that never reports back is replaced after
    /// another recovery timeout.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure_time
                    .is_none_or(|t| now.duration_since(t) >= self.config.recovery_timeout);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started = Some(now);
                    tracing::info!(
                        previous_state = "open",
                        new_state = "half_open",
                        "circuit breaker admitting trial request"
                    );
                }
                cooled
            }
            CircuitState::HalfOpen => {
                let stale = inner
                    .trial_started
                    .is_none_or(|t| now.duration_since(t) >= self.config.recovery_timeout);
                if stale {
                    inner.trial_started = Some(now);
                }
                stale
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.trial_started = None;
                tracing::info!(
                    previous_state = "half_open",
                    new_state = "closed",
                    "circuit breaker closed after successful trial"
                );
            }
            // A call admitted before the circuit opened; the open period stands.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    failure_count = inner.failure_count,
                    recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.trial_started = None;
                tracing::warn!(
                    previous_state = "half_open",
                    new_state = "open",
                    "circuit breaker trial failed"
                );
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    /// Runs `fut` behind the breaker, recording its outcome.
    pub async fn call<F, T, E>(&self, fut: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.is_available() {
            return Err(BreakerError::Open);
        }
        match fut.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_secs(recovery_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let cb = breaker(3, 30);
        for _ in 0..2 {
            cb.record_failure();
            assert!(cb.is_available());
        }
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let cb = breaker(3, 30);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_one_trial_then_closes_on_success() {
        let cb = breaker(2, 30);
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_available());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!cb.is_available());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.is_available());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.is_available(), "only one trial while half-open");

        cb.record_success();
        assert_eq!(
            cb.snapshot(),
            CircuitSnapshot {
                state: CircuitState::Closed,
                failure_count: 0
            }
        );
        assert!(cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens() {
        let cb = breaker(1, 10);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.is_available());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_available());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_is_replaced() {
        let cb = breaker(1, 10);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.is_available());
        assert!(!cb.is_available());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.is_available());
        assert!(!cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn call_records_outcomes_and_fails_fast() {
        let cb = breaker(2, 60);
        let ok: Result<u32, BreakerError<&str>> = cb.call(async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        for _ in 0..2 {
            let err = cb.call(async { Err::<u32, _>("boom") }).await;
            assert!(matches!(err, Err(BreakerError::Inner("boom"))));
        }

        let mut invoked = false;
        let rejected = cb
            .call(async {
                invoked = true;
                Ok::<u32, &str>(1)
            })
            .await;
        assert!(matches!(rejected, Err(BreakerError::Open)));
        assert!(!invoked);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_threshold_is_treated_as_one() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 0,
            recovery_timeout: Duration::from_secs(1),
        });
        assert!(cb.is_available());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
