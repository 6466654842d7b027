use serde::{Deserialize, Serialize};

/// Absorbs float drift when refills land exactly on a whole token.
pub const TOKEN_EPSILON: f64 = 1e-6;

/// Token bucket snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct TokenBucketState {
    pub tokens: f64,
    pub last_refill: f64, // unix seconds
}

impl TokenBucketState {
    pub fn full(bucket_size: f64, now: f64) -> Self {
        Self {
            tokens: bucket_size,
            last_refill: now,
        }
    }

    /// Adds tokens for the time elapsed since the last refill, capped at
    /// `bucket_size`. A clock that moved backwards adds nothing.
    pub fn refill(&mut self, now: f64, refill_rate: f64, bucket_size: f64) {
        let elapsed = (now - self.last_refill).max(0.0);
        self.tokens = (self.tokens + elapsed * refill_rate).min(bucket_size);
        self.last_refill = now;
    }

    /// Takes one token if a whole token is available.
    pub fn take(&mut self) -> bool {
        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refill_caps_at_bucket_size() {
        let mut state = TokenBucketState {
            tokens: 0.0,
            last_refill: 0.0,
        };
        state.refill(2.0, 1.5, 10.0);
        assert!((state.tokens - 3.0).abs() < 1e-9);

        state.refill(100.0, 1.5, 10.0);
        assert_eq!(state.tokens, 10.0);
        assert_eq!(state.last_refill, 100.0);
    }

    #[test]
    fn take_needs_a_whole_token() {
        let mut state = TokenBucketState::full(1.0, 0.0);
        assert!(state.take());
        assert!(!state.take());
        state.tokens = 1.0 - TOKEN_EPSILON / 2.0;
        assert!(state.take());
        assert_eq!(state.tokens, 0.0);
    }

    #[test]
    fn refill_ignores_backwards_clock() {
        let mut state = TokenBucketState::full(5.0, 50.0);
        state.tokens = 1.0;
        state.refill(40.0, 2.0, 5.0);
        assert_eq!(state.tokens, 1.0);
    }
}
