use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
    response::IntoResponse,
};
use futures_util::future::join_all;

use crate::{AppState, auth::Claims, error::AppError, utils::success_to_api_response};

use super::model::{RelatedKeywordsRequest, RelatedKeywordsResponse, SeedResult};

/// Looks up related keywords for each seed concurrently. A failing upstream
/// degrades the affected entries; the request itself still succeeds.
#[axum::debug_handler]
pub async fn related_keywords(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    payload: Result<Json<RelatedKeywordsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let (seeds, limit) = req.validate()?;

    let client = &state.integrations.dataforseo;
    let outcomes = join_all(seeds.iter().map(|seed| client.related_keywords(seed, limit))).await;

    let results: Vec<SeedResult> = seeds
        .into_iter()
        .zip(outcomes)
        .map(|(seed, outcome)| SeedResult::from_outcome(seed, outcome))
        .collect();

    tracing::info!(
        user_id = %claims.sub,
        seeds = results.len(),
        failed = results.iter().filter(|r| r.error.is_some()).count(),
        "related keywords lookup"
    );
    Ok(success_to_api_response(RelatedKeywordsResponse { results }))
}
