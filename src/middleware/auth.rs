use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::{AppState, auth::AuthError, error::AppError};

/// Raw bearer token of an authenticated request, for handlers that revoke it.
#[derive(Debug, Clone)]
pub struct AuthToken(pub String);

/// Validates the bearer token through the JWT cache, rejects revoked tokens,
/// and attaches [`Claims`](crate::auth::Claims) and [`AuthToken`] to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .ok_or(AuthError::MissingToken)?;

    let claims = state.jwt_cache.validate_token_cached(&token).await?;
    if state.blacklist.is_revoked(&claims).await {
        tracing::info!(user_id = %claims.sub, jti = %claims.jti, "rejected revoked token");
        return Err(AuthError::Revoked.into());
    }

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(AuthToken(token));
    Ok(next.run(req).await)
}
