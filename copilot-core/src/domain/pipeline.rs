//! Pipeline domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::spec::PipelineSpec;
use crate::domain::validation::Violation;

/// Persisted pipeline
///
/// Owned by the orchestrator's registry; clients only ever read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: Uuid,
    /// SHA-256 of the normalized request text
    pub identity_hash: String,
    pub name: String,
    pub description: String,
    pub request_text: String,
    pub code: String,
    pub spec: PipelineSpec,
    pub status: PipelineStatus,
    /// Findings from the last failed validation
    pub violations: Vec<Violation>,
    /// Artifact-store location of the code bundle, set once active
    pub artifact_ref: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Pipeline lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Draft,
    Validating,
    Active,
    ValidationFailed,
    Retired,
}

impl PipelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Draft => "draft",
            PipelineStatus::Validating => "validating",
            PipelineStatus::Active => "active",
            PipelineStatus::ValidationFailed => "validation_failed",
            PipelineStatus::Retired => "retired",
        }
    }

    /// Failed records never satisfy request de-duplication
    pub fn is_failed(self) -> bool {
        matches!(self, PipelineStatus::ValidationFailed)
    }

    /// Statuses that must have a stored code bundle
    pub fn has_artifact(self) -> bool {
        matches!(self, PipelineStatus::Active | PipelineStatus::Retired)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PipelineStatus::Draft),
            "validating" => Ok(PipelineStatus::Validating),
            "active" => Ok(PipelineStatus::Active),
            "validation_failed" => Ok(PipelineStatus::ValidationFailed),
            "retired" => Ok(PipelineStatus::Retired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string that matches no known variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}
