use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    error::{AppError, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER},
    utils::client_ip,
};

/// Applies the rule matching the request path, keyed by client address.
pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let ip = client_ip(&req);
    let path = req.uri().path().to_string();
    let rule = state.config.rate_limit.rule_for(&path);

    let decision = state
        .rate_limiter
        .check(&ip, &path, rule.algorithm, &rule.params)
        .await;

    if !decision.allowed {
        let retry_after_secs = decision.retry_after_secs().unwrap_or(1);
        tracing::warn!(
            ip = %ip,
            path = %path,
            algorithm = %rule.algorithm,
            retry_after_secs,
            "rate limit exceeded"
        );
        return AppError::RateLimited {
            retry_after_secs,
            limit: decision.limit,
        }
        .into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(decision.remaining));
    response
}
