//! Typed records stored as JSON in the shared store.
pub mod rate_limit;
pub mod token;

pub use rate_limit::{TOKEN_EPSILON, TokenBucketState};
pub use token::CachedTokenValidation;
