//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod execution;
pub mod health;
pub mod pipeline;

use std::sync::Arc;

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::{ExecutionTracker, PipelineRegistry};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PipelineRegistry>,
    pub tracker: Arc<ExecutionTracker>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/create", post(pipeline::create_pipeline))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route("/pipeline/catalog", get(pipeline::get_catalog))
        .route("/pipeline/{id}", get(pipeline::get_pipeline))
        .route("/pipeline/{id}/validate", post(pipeline::validate_pipeline))
        .route("/pipeline/{id}/retire", post(pipeline::retire_pipeline))
        .route("/pipeline/{id}/consistency", get(pipeline::check_consistency))
        .route("/pipeline/{id}/trigger", post(execution::trigger_execution))
        // Execution endpoints
        .route("/execution/list", get(execution::list_executions))
        .route(
            "/execution/pipeline/{id}",
            get(execution::list_executions_by_pipeline),
        )
        .route("/execution/{id}", get(execution::get_execution))
        .route("/execution/{id}/status", post(execution::report_status))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
