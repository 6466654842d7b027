use std::net::SocketAddr;

use axum::{
    Json,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::result::ApiResult;

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// SHA-256 of the raw token, hex encoded. Raw tokens never become store keys.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolves the caller's address: `x-real-ip`, then the first non-empty
/// `x-forwarded-for` entry, then the socket peer.
pub fn client_ip<B>(req: &Request<B>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    forwarded_ip(req.headers())
        .or(remote_ip)
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .map(|ip| ip.trim().to_string())
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResult<T>> {
    Json(ApiResult::success(data))
}
