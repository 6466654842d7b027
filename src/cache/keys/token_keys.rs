use crate::utils::hash_token;

/// Cached validation verdicts
const JWT_CACHE_PREFIX: &str = "jwt_cache:token:";

/// Per-user index over cached verdicts
const JWT_USER_INDEX_PREFIX: &str = "jwt_cache:user:";

const BLACKLIST_TOKEN_PREFIX: &str = "auth:blacklist:token:";

const BLACKLIST_USER_PREFIX: &str = "auth:blacklist:user:";

pub fn jwt_cache_key(token_hash: &str) -> String {
    format!("{}{}", JWT_CACHE_PREFIX, token_hash)
}

/// The user id is hashed so ids holding `:` or glob characters cannot reach
/// into another user's index.
pub fn jwt_user_index_key(user_id: &str, token_hash: &str) -> String {
    format!("{}{}:{}", JWT_USER_INDEX_PREFIX, hash_token(user_id), token_hash)
}

/// Matches every index entry of one user.
pub fn jwt_user_index_pattern(user_id: &str) -> String {
    format!("{}{}:*", JWT_USER_INDEX_PREFIX, hash_token(user_id))
}

pub fn blacklist_token_key(jti: &str) -> String {
    format!("{}{}", BLACKLIST_TOKEN_PREFIX, jti)
}

pub fn blacklist_user_key(user_id: &str) -> String {
    format!("{}{}", BLACKLIST_USER_PREFIX, user_id)
}
