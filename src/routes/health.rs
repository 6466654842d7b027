use axum::{extract::State, response::IntoResponse};
use serde::Serialize;

use crate::{
    AppState,
    resilience::{CircuitSnapshot, CircuitState},
    utils::success_to_api_response,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub circuit_breaker: CircuitSnapshot,
}

/// Reports store reachability and the integration breaker. Always 200 so load
/// balancers can read the body; `status` is `degraded` when either is unhealthy.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.store.ping().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unreachable");
            "down"
        }
    };
    // is_available would claim the half-open trial
    let circuit_breaker = state.integrations.breaker.snapshot();
    let status = if store == "up" && circuit_breaker.state != CircuitState::Open {
        "ok"
    } else {
        "degraded"
    };

    success_to_api_response(HealthResponse {
        status,
        store,
        circuit_breaker,
    })
}
