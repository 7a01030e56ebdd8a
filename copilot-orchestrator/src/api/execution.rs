//! Execution API Handlers
//!
//! HTTP endpoints for triggering runs and tracking their progress.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use copilot_core::domain::execution::ExecutionRecord;
use copilot_core::dto::execution::{
    ExecutionFilter, StatusReport, TriggerExecution, TriggerResponse,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /pipeline/{id}/trigger
/// Queue a run of an active pipeline
pub async fn trigger_execution(
    State(state): State<AppState>,
    Path(pipeline_id): Path<Uuid>,
    Json(req): Json<TriggerExecution>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    tracing::info!("Triggering pipeline: {}", pipeline_id);

    let execution_id = state.tracker.trigger(pipeline_id, req.input).await?;

    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { execution_id })))
}

/// GET /execution/list?status=
pub async fn list_executions(
    State(state): State<AppState>,
    Query(filter): Query<ExecutionFilter>,
) -> ApiResult<Json<Vec<ExecutionRecord>>> {
    let status = filter
        .status
        .ok_or_else(|| ApiError::BadRequest("status query parameter is required".to_string()))?;

    tracing::debug!("Listing {} executions", status);

    let executions = state.tracker.list_by_status(status).await?;

    Ok(Json(executions))
}

/// GET /execution/pipeline/{id}
pub async fn list_executions_by_pipeline(
    State(state): State<AppState>,
    Path(pipeline_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExecutionRecord>>> {
    tracing::debug!("Listing executions for pipeline: {}", pipeline_id);

    let executions = state.tracker.list_for_pipeline(pipeline_id).await?;

    Ok(Json(executions))
}

/// GET /execution/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ExecutionRecord>> {
    tracing::debug!("Getting execution: {}", id);

    let execution = state.tracker.get_status(id).await?;

    Ok(Json(execution))
}

/// POST /execution/{id}/status
/// Status callback from the runner
pub async fn report_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(report): Json<StatusReport>,
) -> ApiResult<Json<ExecutionRecord>> {
    tracing::info!("Execution {} reported {}", id, report.status);

    let execution = state.tracker.report_status(id, report).await?;

    Ok(Json(execution))
}
