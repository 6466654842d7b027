use axum::{
    extract::{Extension, State},
    response::IntoResponse,
};

use crate::{
    AppState, auth::Claims, error::AppError, middleware::AuthToken,
    utils::success_to_api_response,
};

use super::model::{CheckTokenResponse, LogoutAllResponse, LogoutResponse, RefreshTokenResponse};

#[axum::debug_handler]
pub async fn check_token(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    success_to_api_response(CheckTokenResponse {
        user_id: claims.sub,
        expires_at: claims.exp,
    })
}

#[axum::debug_handler]
pub async fn refresh_token(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let (token, fresh) = state.jwt.generate_token(&claims.sub)?;
    Ok(success_to_api_response(RefreshTokenResponse {
        token,
        expires_at: fresh.exp,
    }))
}

/// Revokes the presented token until it would have expired.
#[axum::debug_handler]
pub async fn logout(
    Extension(claims): Extension<Claims>,
    Extension(AuthToken(token)): Extension<AuthToken>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let ttl = state.blacklist.remaining_lifetime(&claims);
    state.blacklist.blacklist_token(&claims.jti, ttl).await?;
    if let Err(e) = state.jwt_cache.invalidate_token(&token).await {
        tracing::warn!(error = %e, user_id = %claims.sub, "failed to evict cached token");
    }
    tracing::info!(user_id = %claims.sub, jti = %claims.jti, "user logged out");
    Ok(success_to_api_response(LogoutResponse { revoked: true }))
}

/// Revokes every token the user holds, including the presented one.
#[axum::debug_handler]
pub async fn logout_all(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state
        .blacklist
        .revoke_all_user_tokens(&claims.sub, state.config.jwt_expiration())
        .await?;
    let sessions_cleared = state.jwt_cache.invalidate_user(&claims.sub).await?;
    Ok(success_to_api_response(LogoutAllResponse { sessions_cleared }))
}
