//! Pipeline DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::PipelineStatus;

/// Request to create a pipeline from natural language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub request_text: String,
}

/// Filter for pipeline listings
///
/// Doubles as the query string of `GET /pipeline/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineFilter {
    pub status: Option<PipelineStatus>,
    /// Case-insensitive substring matched against name and description
    pub q: Option<String>,
    pub limit: Option<u32>,
}

impl PipelineFilter {
    pub fn with_status(mut self, status: PipelineStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }
}

/// Scheduler catalog entry for an active, scheduled pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub schedule: String,
}
