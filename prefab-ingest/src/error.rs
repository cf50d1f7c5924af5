//! Error types for prefab-ingest
//!
//! Maps pipeline failures onto HTTP status codes with a stable JSON body:
//! `{"error": {"code": ..., "message": ..., ...details}}`

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::reconcile::ReconcileError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unreadable request body (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Pipeline failure, mapped by kind
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Reconcile(err) => match err {
                ReconcileError::Validation(_) => StatusCode::BAD_REQUEST,
                ReconcileError::OrphanScheduleRows { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ReconcileError::DuplicateComponent { .. }
                | ReconcileError::InvalidTransition { .. } => StatusCode::CONFLICT,
                ReconcileError::NotFound(_) => StatusCode::NOT_FOUND,
                ReconcileError::AllocationExhausted { .. } | ReconcileError::Persistence(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Reconcile(err) => err.code(),
        }
    }

    /// Structured details callers use to pick a resolution strategy
    fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            ApiError::Reconcile(ReconcileError::OrphanScheduleRows { keys }) => {
                details.insert("keys".into(), json!(keys));
            }
            ApiError::Reconcile(ReconcileError::DuplicateComponent {
                project_id,
                component_id,
                staging_count,
                production_exists,
            }) => {
                details.insert("projectId".into(), json!(project_id));
                details.insert("componentId".into(), json!(component_id));
                details.insert("stagingCount".into(), json!(staging_count));
                details.insert("productionExists".into(), json!(production_exists));
            }
            _ => {}
        }
        details
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut error = self.details();
        error.insert("code".into(), json!(self.code()));
        error.insert("message".into(), json!(self.to_string()));

        let body = Json(json!({ "error": error }));
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
