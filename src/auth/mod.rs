//! Token issuing, cached validation and revocation.

use thiserror::Error;

pub mod blacklist;
pub mod jwt;
pub mod jwt_cache;

pub use blacklist::TokenBlacklist;
pub use jwt::{Claims, JwtService, TokenVerifier};
pub use jwt_cache::JwtCacheService;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
    #[error("failed to issue token: {0}")]
    Issue(String),
}
