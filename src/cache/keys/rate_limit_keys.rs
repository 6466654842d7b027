/// Rate limit key prefix
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// `rate_limit:{algorithm}:{identifier}:{endpoint}`
pub fn rate_limit_key(algorithm: &str, identifier: &str, endpoint: &str) -> String {
    format!("{}{}:{}:{}", RATE_LIMIT_PREFIX, algorithm, identifier, endpoint)
}

/// Fixed-window counter key, one per window index.
pub fn fixed_window_key(identifier: &str, endpoint: &str, window_index: i64) -> String {
    format!(
        "{}:{}",
        rate_limit_key("fixed_window", identifier, endpoint),
        window_index
    )
}
