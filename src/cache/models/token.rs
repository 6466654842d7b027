use serde::{Deserialize, Serialize};

use crate::auth::Claims;

/// Cached JWT validation verdict.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachedTokenValidation {
    pub valid: bool,
    pub payload: Claims,
    pub expires_at: i64, // Unix timestamp
}
