use axum::Json;
use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::cache::StoreError;
use crate::integrations::IntegrationError;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64, limit: u32 },
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) | AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "E001",
            AppError::Unauthorized(_) => "E002",
            AppError::Forbidden(_) => "E003",
            AppError::NotFound(_) => "E004",
            AppError::RateLimited { .. } => "E005",
            AppError::Upstream(_) => "E006",
            AppError::ServiceUnavailable(_) => "E007",
            AppError::Store(_) => "E008",
            AppError::BadRequest(_) => "E009",
            AppError::Internal(_) => "E010",
        }
    }
}

/// Error body. `request_id` is filled in by the error-logging middleware.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error_message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            code: self.code(),
            error_message: self.to_string(),
        });

        let mut response = (status, body).into_response();
        if let AppError::RateLimited {
            retry_after_secs,
            limit,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
        }
        response
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Issue(msg) => AppError::Internal(format!("failed to issue token: {msg}")),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<IntegrationError> for AppError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::CircuitOpen | IntegrationError::NotConfigured(_) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_maps_to_401_e002() {
        let response = AppError::from(AuthError::MissingToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["code"], "E002");
        assert_eq!(body["error_message"], "missing bearer token");
    }

    #[tokio::test]
    async fn rate_limited_sets_headers() {
        let response = AppError::RateLimited {
            retry_after_secs: 7,
            limit: 10,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
        assert_eq!(response.headers()[RATE_LIMIT_LIMIT_HEADER], "10");
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING_HEADER], "0");
        assert_eq!(body_json(response).await["code"], "E005");
    }

    #[test]
    fn error_codes_follow_status_table() {
        let cases = [
            (AppError::Validation("x".into()), 422, "E001"),
            (AppError::Forbidden("x".into()), 403, "E003"),
            (AppError::NotFound("x".into()), 404, "E004"),
            (AppError::Upstream("x".into()), 502, "E006"),
            (AppError::ServiceUnavailable("x".into()), 503, "E007"),
            (AppError::Store(StoreError::Connection("down".into())), 503, "E008"),
            (AppError::BadRequest("x".into()), 400, "E009"),
            (AppError::Internal("x".into()), 500, "E010"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn open_circuit_is_service_unavailable() {
        let err = AppError::from(IntegrationError::CircuitOpen);
        assert_eq!(err.code(), "E007");
        let err = AppError::from(IntegrationError::Status(500));
        assert_eq!(err.code(), "E006");
    }
}
