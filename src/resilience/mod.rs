//! Fault handling for outbound calls: an in-process circuit breaker and an
//! exponential-backoff retry wrapper.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
};
pub use retry::RetryHandler;
