//! Health Check API Handler
//!
//! Reports reachability of the metadata and artifact stores.

use axum::{Json, extract::State, http::StatusCode};
use copilot_core::dto::health::HealthReport;

use crate::api::AppState;

/// GET /health
/// 200 when both stores answer, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.registry.health().await;

    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        tracing::warn!("Health check failed: {:?}", report);
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}
