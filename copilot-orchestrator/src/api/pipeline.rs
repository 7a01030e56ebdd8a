//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use copilot_core::domain::pipeline::PipelineRecord;
use copilot_core::dto::pipeline::{CatalogEntry, CreatePipeline, PipelineFilter};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /pipeline/create
/// Create a draft pipeline from a natural-language request
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::info!("Creating pipeline from {} byte request", req.request_text.len());

    let pipeline = state.registry.create(&req.request_text).await?;

    Ok(Json(pipeline))
}

/// GET /pipeline/list
pub async fn list_pipelines(
    State(state): State<AppState>,
    Query(filter): Query<PipelineFilter>,
) -> ApiResult<Json<Vec<PipelineRecord>>> {
    tracing::debug!("Listing pipelines: {:?}", filter);

    let pipelines = state.registry.list(&filter).await?;

    Ok(Json(pipelines))
}

/// GET /pipeline/catalog
/// Active pipelines carrying a schedule, for the external scheduler
pub async fn get_catalog(State(state): State<AppState>) -> ApiResult<Json<Vec<CatalogEntry>>> {
    tracing::debug!("Building scheduler catalog");

    let catalog = state.registry.catalog().await?;

    Ok(Json(catalog))
}

/// GET /pipeline/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = state.registry.get(id).await?;

    Ok(Json(pipeline))
}

/// POST /pipeline/{id}/validate
/// Run the validator; 422 carries the violation list
pub async fn validate_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::info!("Validating pipeline: {}", id);

    let pipeline = state.registry.validate(id).await?;

    Ok(Json(pipeline))
}

/// POST /pipeline/{id}/retire
pub async fn retire_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::info!("Retiring pipeline: {}", id);

    let pipeline = state.registry.retire(id).await?;

    Ok(Json(pipeline))
}

/// GET /pipeline/{id}/consistency
/// 204 when the stored artifact matches the record
pub async fn check_consistency(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::debug!("Checking consistency of pipeline: {}", id);

    state.registry.check_consistency(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
