//! prefab-ingest library interface
//!
//! Component identity reconciliation and approval for machine-parsed panel
//! submissions, plus the HTTP surface reviewers drive it through.

pub mod api;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::SqliteStore;
use crate::reconcile::ReconcileResult;
use crate::services::ReviewService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub review: Arc<ReviewService<SqliteStore>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last server-side failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(review: ReviewService<SqliteStore>) -> Self {
        Self {
            review: Arc::new(review),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Convert a pipeline result, remembering server-side failures
    pub async fn track<T>(&self, result: ReconcileResult<T>) -> ApiResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = ApiError::from(err);
                if err.status().is_server_error() {
                    *self.last_error.write().await = Some(err.to_string());
                }
                Err(err)
            }
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::staging_routes())
        .merge(api::approval_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
