//! Store errors shared by the metadata and artifact stores

use copilot_core::dto::error::FailureClass;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the metadata store or the artifact store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Artifact IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("A live pipeline with identity {0} already exists")]
    DuplicateIdentity(String),

    #[error("Pipeline {0} does not exist")]
    MissingPipeline(Uuid),

    #[error("Pipeline {0} is not active")]
    PipelineNotActive(Uuid),

    #[error("Artifact {0} already exists")]
    ArtifactExists(String),

    #[error("Artifact {0} not found")]
    ArtifactMissing(String),

    #[error("Artifact {0} failed its checksum")]
    ArtifactChecksum(String),
}

impl StoreError {
    /// Corrupt rows and broken artifacts will not heal on retry
    pub fn class(&self) -> FailureClass {
        match self {
            StoreError::Corrupt { .. } | StoreError::ArtifactChecksum(_) => FailureClass::Integrity,
            _ => FailureClass::Transient,
        }
    }

    pub(crate) fn corrupt(id: Uuid, reason: impl std::fmt::Display) -> Self {
        StoreError::Corrupt {
            id,
            reason: reason.to_string(),
        }
    }
}
