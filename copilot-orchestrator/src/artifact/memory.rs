//! In-memory artifact store for tests and local development

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ArtifactStore, PutMode, artifact_key};
use crate::repository::StoreError;

#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.blobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Drop a stored blob, simulating external loss
    #[cfg(test)]
    pub fn remove(&self, location: &str) {
        self.blobs().remove(location);
    }

    /// Overwrite a stored blob behind the registry's back
    #[cfg(test)]
    pub fn tamper(&self, location: &str, code: &str) {
        self.blobs().insert(location.to_string(), code.to_string());
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(
        &self,
        pipeline_id: Uuid,
        code: &str,
        mode: PutMode,
    ) -> Result<String, StoreError> {
        let key = artifact_key(pipeline_id);
        let mut blobs = self.blobs();

        if mode == PutMode::CreateNew && blobs.contains_key(&key) {
            return Err(StoreError::ArtifactExists(key));
        }

        blobs.insert(key.clone(), code.to_string());
        Ok(key)
    }

    async fn get(&self, location: &str) -> Result<String, StoreError> {
        self.blobs()
            .get(location)
            .cloned()
            .ok_or_else(|| StoreError::ArtifactMissing(location.to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
