mod auth;
mod error_handler;
mod rate_limit;

pub use auth::{AuthToken, auth_middleware};
pub use error_handler::{REQUEST_ID_HEADER, log_errors, panic_response};
pub use rate_limit::rate_limit;
