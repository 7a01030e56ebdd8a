//! Execution DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::ExecutionStatus;

/// Request to trigger a run of an active pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerExecution {
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Accepted trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub execution_id: Uuid,
}

/// Status callback from the external runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
}

impl StatusReport {
    pub fn running() -> Self {
        Self {
            status: ExecutionStatus::Running,
            error_message: None,
            output: None,
        }
    }

    pub fn succeeded(output: Option<serde_json::Value>) -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            error_message: None,
            output,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            error_message: Some(error_message.into()),
            output: None,
        }
    }
}

/// Query string of `GET /execution/list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
}
