//! Artifact Module
//!
//! Blob storage for generated pipeline code. A pipeline's artifact is written
//! once, on its `validating -> active` transition; [`PutMode::Replace`] exists
//! only for retrying a validation that was interrupted after the write.

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::InMemoryArtifactStore;

use async_trait::async_trait;
use copilot_core::domain::pipeline::PipelineRecord;
use uuid::Uuid;

use crate::repository::StoreError;

/// How `put` treats an existing artifact for the same pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with [`StoreError::ArtifactExists`]
    CreateNew,
    /// Overwrite it
    Replace,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `code` for `pipeline_id`, returning its location reference
    async fn put(&self, pipeline_id: Uuid, code: &str, mode: PutMode)
    -> Result<String, StoreError>;

    /// Load the code stored at `location`
    ///
    /// Fails with [`StoreError::ArtifactMissing`] when nothing is stored there.
    async fn get(&self, location: &str) -> Result<String, StoreError>;

    /// Cheap reachability check
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Location reference of a pipeline's code bundle
pub fn artifact_key(pipeline_id: Uuid) -> String {
    format!("pipelines/{pipeline_id}/pipeline.lua")
}

/// Describe what is wrong with a pipeline's stored artifact, if anything
///
/// Records without an artifact reference are only a problem once the
/// pipeline has been activated.
pub async fn verify(
    store: &dyn ArtifactStore,
    record: &PipelineRecord,
) -> Result<Option<String>, StoreError> {
    let Some(location) = &record.artifact_ref else {
        return Ok(record
            .status
            .has_artifact()
            .then(|| "pipeline has no artifact reference".to_string()));
    };

    match store.get(location).await {
        Ok(code) if code == record.code => Ok(None),
        Ok(_) => Ok(Some(format!("artifact {location} differs from the recorded code"))),
        Err(StoreError::ArtifactMissing(_)) => Ok(Some(format!("artifact {location} is missing"))),
        Err(StoreError::ArtifactChecksum(_)) => {
            Ok(Some(format!("artifact {location} failed its checksum")))
        }
        Err(e) => Err(e),
    }
}
