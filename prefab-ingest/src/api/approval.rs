//! Approval API handlers
//!
//! POST /staging/:id/approve, POST /approve

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::reconcile::{ApprovalOptions, ApprovalOutcome};
use crate::AppState;

/// POST /approve request: a submission that was never staged
#[derive(Debug, Deserialize)]
pub struct DirectApprovalRequest {
    pub submission: Value,
    #[serde(default)]
    pub options: ApprovalOptions,
}

/// POST /staging/:id/approve
///
/// Body is the resolution options (`overrideComponentId`, `overwriteProduction`,
/// `autoSuffix`, `dryRun`, `approver`); `{}` approves with no strategy.
pub async fn approve_staging(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ApprovalOptions>, JsonRejection>,
) -> ApiResult<Json<ApprovalOutcome>> {
    let Json(options) = payload?;
    let outcome = state
        .track(state.review.approve_staging(id, &options).await)
        .await?;
    Ok(Json(outcome))
}

/// POST /approve
pub async fn approve_direct(
    State(state): State<AppState>,
    payload: Result<Json<DirectApprovalRequest>, JsonRejection>,
) -> ApiResult<Json<ApprovalOutcome>> {
    let Json(request) = payload?;
    let outcome = state
        .track(
            state
                .review
                .approve_raw(request.submission, &request.options)
                .await,
        )
        .await?;
    Ok(Json(outcome))
}

/// Build approval routes
pub fn approval_routes() -> Router<AppState> {
    Router::new()
        .route("/staging/:id/approve", post(approve_staging))
        .route("/approve", post(approve_direct))
}
