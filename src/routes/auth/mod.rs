mod handler;
mod model;

pub use handler::{check_token, logout, logout_all, refresh_token};
pub use model::{CheckTokenResponse, LogoutAllResponse, LogoutResponse, RefreshTokenResponse};
