//! Health check endpoint
//!
//! Reports the database as reachable when the review queue can be read.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database cannot be read
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database_reachable: bool,
    /// Submissions awaiting review; absent when the database is unreachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_reviews: Option<usize>,
    /// Last server-side failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    let pending_reviews = match state.review.pending_backlog().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, "Health check could not read the staging queue");
            None
        }
    };
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if pending_reviews.is_some() { "ok" } else { "degraded" },
        module: "prefab-ingest",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        database_reachable: pending_reviews.is_some(),
        pending_reviews,
        last_error,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
