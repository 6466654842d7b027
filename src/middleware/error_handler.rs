use std::any::Any;

use axum::{
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{error, warn};

use crate::error::AppError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_ERROR_BODY: usize = 64 * 1024;

/// Logs 4xx at `warn` and 5xx at `error`, and stamps the request id into
/// JSON error bodies.
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_ERROR_BODY).await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to read error response body");
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let bytes = match (&request_id, is_json(&parts.headers)) {
        (Some(id), true) => with_request_id(bytes, id),
        _ => bytes,
    };
    let body_str = String::from_utf8_lossy(&bytes);
    let request_id = request_id.as_deref().unwrap_or("-");

    if status.is_server_error() {
        error!(%status, %method, path = %path, request_id, body = %body_str, "request failed");
    } else {
        warn!(%status, %method, path = %path, request_id, body = %body_str, "request rejected");
    }

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

fn with_request_id(bytes: Bytes, request_id: &str) -> Bytes {
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut body)) => {
            body.insert("request_id".into(), Value::String(request_id.to_string()));
            match serde_json::to_vec(&body) {
                Ok(encoded) => Bytes::from(encoded),
                Err(_) => bytes,
            }
        }
        _ => bytes,
    }
}

/// Turns a handler panic into an E010 response.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "handler panicked");
    AppError::Internal("internal server error".into()).into_response()
}
