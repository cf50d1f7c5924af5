//! Staging review API handlers
//!
//! POST/GET /staging, GET/PUT /staging/:id, the per-record review views and
//! the cross-record duplicate summary

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use prefab_common::db::StagingRecord;

use crate::error::ApiResult;
use crate::reconcile::{DuplicateReport, ScoreBreakdown};
use crate::services::{Comparison, IdSuggestion, StagingSummary};
use crate::AppState;

/// POST /staging/:id/reject request
#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reviewer: Option<String>,
}

/// POST /staging
///
/// Stage a parsed submission. Returns 201 with the pending record.
pub async fn create_staging(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StagingRecord>)> {
    let Json(raw_data) = payload?;
    let record = state.track(state.review.ingest(raw_data).await).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /staging
///
/// Pending queue with confidence and duplicate annotations.
pub async fn list_staging(State(state): State<AppState>) -> ApiResult<Json<Vec<StagingSummary>>> {
    let summaries = state.track(state.review.list_pending().await).await?;
    Ok(Json(summaries))
}

/// GET /staging/:id
pub async fn get_staging(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StagingRecord>> {
    Ok(Json(state.track(state.review.get(id).await).await?))
}

/// PUT /staging/:id
///
/// Replace a pending record's raw data (reviewer correction).
pub async fn update_staging(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<StagingRecord>> {
    let Json(raw_data) = payload?;
    let record = state
        .track(state.review.update_raw_data(id, raw_data).await)
        .await?;
    Ok(Json(record))
}

/// GET /staging/:id/score
pub async fn score_staging(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScoreBreakdown>> {
    Ok(Json(state.track(state.review.score(id).await).await?))
}

/// GET /staging/:id/duplicates
pub async fn staging_duplicates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DuplicateReport>> {
    Ok(Json(state.track(state.review.duplicates(id).await).await?))
}

/// GET /duplicates
///
/// Pairs shared by more than one staged submission or already in production.
pub async fn duplicate_summary(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DuplicateReport>>> {
    Ok(Json(state.track(state.review.duplicate_summary().await).await?))
}

/// GET /staging/:id/comparison
pub async fn staging_comparison(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Comparison>> {
    Ok(Json(state.track(state.review.comparison(id).await).await?))
}

/// GET /staging/:id/suggested-id
pub async fn suggested_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IdSuggestion>> {
    Ok(Json(
        state
            .track(state.review.suggest_component_id(id).await)
            .await?,
    ))
}

/// POST /staging/:id/reject
pub async fn reject_staging(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RejectRequest>, JsonRejection>,
) -> ApiResult<Json<StagingRecord>> {
    let Json(request) = payload?;
    let record = state
        .track(state.review.reject(id, request.reviewer.as_deref()).await)
        .await?;
    Ok(Json(record))
}

/// Build staging routes
pub fn staging_routes() -> Router<AppState> {
    Router::new()
        .route("/staging", post(create_staging).get(list_staging))
        .route("/staging/:id", get(get_staging).put(update_staging))
        .route("/staging/:id/score", get(score_staging))
        .route("/staging/:id/duplicates", get(staging_duplicates))
        .route("/staging/:id/comparison", get(staging_comparison))
        .route("/staging/:id/suggested-id", get(suggested_id))
        .route("/staging/:id/reject", post(reject_staging))
        .route("/duplicates", get(duplicate_summary))
}
