//! Per-client, per-endpoint request limiting over the shared store.
//!
//! Four algorithms are available:
//!
//! - **Sliding window**: an ordered set of request timestamps per key; entries
//!   older than the window are evicted before counting.
//! - **Fixed window**: one counter per `floor(now / window)` bucket.
//! - **Token bucket**: `(tokens, last_refill)` refilled continuously at
//!   `refill_rate`, capped at `bucket_size`.
//! - **Adaptive**: a sliding window whose limit shrinks under system load.
//!
//! Store failures never reject a request: the limiter fails open and logs.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod limiter;
pub mod load;
pub mod policy;

pub use limiter::RateLimiter;
pub use load::{FixedLoad, LoadAverage, LoadProbe, adaptive_limit};
pub use policy::RateLimitPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("unknown rate limit algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("invalid rate limit rule {0:?}: expected algorithm:max:window_secs")]
    Malformed(String),
    #[error("rate limit {field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAlgorithm {
    SlidingWindow,
    FixedWindow,
    TokenBucket,
    Adaptive,
}

impl RateLimitAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlidingWindow => "sliding_window",
            Self::FixedWindow => "fixed_window",
            Self::TokenBucket => "token_bucket",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for RateLimitAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitAlgorithm {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sliding_window" | "sliding" => Ok(Self::SlidingWindow),
            "fixed_window" | "fixed" => Ok(Self::FixedWindow),
            "token_bucket" | "bucket" => Ok(Self::TokenBucket),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(RuleError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Limits for one rule. Window algorithms read `max_requests` and `window`;
/// the token bucket reads `bucket_size` and `refill_rate` (tokens/second).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitParams {
    pub max_requests: u32,
    pub window: Duration,
    pub bucket_size: u32,
    pub refill_rate: f64,
}

impl RateLimitParams {
    /// `max_requests` per `window`. The derived bucket allows the same burst
    /// and refills at the same average rate.
    pub fn per_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            bucket_size: max_requests,
            refill_rate: max_requests as f64 / window.as_secs_f64(),
        }
    }

    pub fn bucket(bucket_size: u32, refill_rate: f64) -> Self {
        Self {
            max_requests: bucket_size,
            window: Duration::from_secs_f64(bucket_size as f64 / refill_rate),
            bucket_size,
            refill_rate,
        }
    }

    fn validate(self) -> Result<Self, RuleError> {
        if self.max_requests == 0 {
            return Err(RuleError::NotPositive {
                field: "max_requests",
                value: "0".into(),
            });
        }
        if self.window.is_zero() {
            return Err(RuleError::NotPositive {
                field: "window",
                value: "0s".into(),
            });
        }
        if self.refill_rate.is_nan() || self.refill_rate <= 0.0 {
            return Err(RuleError::NotPositive {
                field: "refill_rate",
                value: self.refill_rate.to_string(),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitRule {
    pub algorithm: RateLimitAlgorithm,
    pub params: RateLimitParams,
}

impl RateLimitRule {
    pub fn new(
        algorithm: RateLimitAlgorithm,
        max_requests: u32,
        window: Duration,
    ) -> Result<Self, RuleError> {
        Ok(Self {
            algorithm,
            params: RateLimitParams::per_window(max_requests, window).validate()?,
        })
    }
}

/// `algorithm:max:window_secs`, e.g. `token_bucket:10:60`.
impl FromStr for RateLimitRule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let [algorithm, max, window] = parts.as_slice() else {
            return Err(RuleError::Malformed(s.to_string()));
        };
        let algorithm: RateLimitAlgorithm = algorithm.parse()?;
        let max: u32 = max
            .trim()
            .parse()
            .map_err(|_| RuleError::Malformed(s.to_string()))?;
        let window: u64 = window
            .trim()
            .parse()
            .map_err(|_| RuleError::Malformed(s.to_string()))?;
        Self::new(algorithm, max, Duration::from_secs(window))
    }
}

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the next request would be admitted; `None` when allowed.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    fn allowed(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after: None,
        }
    }

    fn rejected(limit: u32, retry_after: f64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after: Some(Duration::from_secs_f64(retry_after.max(0.0))),
        }
    }

    /// Whole seconds for a `Retry-After` header, at least one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|d| d.as_secs_f64().ceil().max(1.0) as u64)
    }
}
