//! Store key builders. Every key the service writes is built here.
pub mod rate_limit_keys;
pub mod token_keys;

pub use rate_limit_keys::{fixed_window_key, rate_limit_key};
pub use token_keys::{
    blacklist_token_key, blacklist_user_key, jwt_cache_key, jwt_user_index_key,
    jwt_user_index_pattern,
};
