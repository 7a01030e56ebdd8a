//! API Error Handling
//!
//! Unified error types and conversion for API responses. Every error body is
//! an [`ErrorBody`] so callers can tell "retry later" from "fix the input"
//! from "client bug" without parsing messages.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use copilot_core::domain::validation::Violation;
use copilot_core::dto::error::{ErrorBody, FailureClass};

use crate::repository::StoreError;
use crate::service::{ExecutionError, PipelineError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    ValidationFailed {
        message: String,
        violations: Vec<Violation>,
    },
    Generator(String),
    Integrity(String),
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, class, message, violations) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, FailureClass::Client, msg, vec![]),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, FailureClass::Input, msg, vec![]),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, FailureClass::Client, msg, vec![]),
            ApiError::ValidationFailed {
                message,
                violations,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                FailureClass::Input,
                message,
                violations,
            ),
            ApiError::Generator(msg) => {
                tracing::warn!("Generator error: {}", msg);
                (StatusCode::BAD_GATEWAY, FailureClass::Transient, msg, vec![])
            }
            ApiError::Integrity(msg) => {
                tracing::error!("Integrity error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    FailureClass::Integrity,
                    msg,
                    vec![],
                )
            }
            ApiError::Store(err) => {
                tracing::error!("Store error: {:?}", err);
                let class = err.class();
                let status = match class {
                    FailureClass::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, class, err.to_string(), vec![])
            }
        };

        let body = ErrorBody {
            error: message,
            class,
            violations,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::NotFound(_) => ApiError::NotFound(message),
            PipelineError::InvalidRequest(_) | PipelineError::RequestRejected(_) => {
                ApiError::BadRequest(message)
            }
            PipelineError::Generation(_) => ApiError::Generator(message),
            PipelineError::ValidationFailed { violations, .. } => ApiError::ValidationFailed {
                message,
                violations,
            },
            PipelineError::InvalidState { .. } => ApiError::Conflict(message),
            PipelineError::Inconsistent { .. } => ApiError::Integrity(message),
            PipelineError::Store(err) => ApiError::Store(err),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        let message = err.to_string();
        match err {
            ExecutionError::NotFound(_) | ExecutionError::PipelineNotFound(_) => {
                ApiError::NotFound(message)
            }
            ExecutionError::InvalidState { .. } | ExecutionError::InvalidTransition { .. } => {
                ApiError::Conflict(message)
            }
            ExecutionError::Inconsistent { .. } => ApiError::Integrity(message),
            ExecutionError::Store(err) => ApiError::Store(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
