//! Filesystem artifact store
//!
//! Code bundles live under `<base>/pipelines/<id>/pipeline.lua` next to a
//! `pipeline.lua.sha256` checksum that is verified on every read.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{ArtifactStore, PutMode, artifact_key};
use crate::repository::StoreError;

pub struct FsArtifactStore {
    base_path: PathBuf,
}

impl FsArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a location reference, refusing anything outside the base path
    fn resolve(&self, location: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(location);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || location.is_empty() {
            return Err(StoreError::ArtifactMissing(location.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    fn checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    fn checksum_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        pipeline_id: Uuid,
        code: &str,
        mode: PutMode,
    ) -> Result<String, StoreError> {
        let key = artifact_key(pipeline_id);
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match mode {
            PutMode::CreateNew => {
                let mut file = match fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .await
                {
                    Ok(file) => file,
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        return Err(StoreError::ArtifactExists(key));
                    }
                    Err(e) => return Err(e.into()),
                };
                file.write_all(code.as_bytes()).await?;
                file.sync_all().await?;
            }
            PutMode::Replace => {
                let staging = path.with_extension("lua.tmp");
                fs::write(&staging, code.as_bytes()).await?;
                fs::rename(&staging, &path).await?;
            }
        }

        fs::write(
            Self::checksum_path(&path),
            Self::checksum(code.as_bytes()),
        )
        .await?;

        tracing::debug!("Stored artifact {} ({} bytes)", key, code.len());

        Ok(key)
    }

    async fn get(&self, location: &str) -> Result<String, StoreError> {
        let path = self.resolve(location)?;

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ArtifactMissing(location.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        match fs::read_to_string(Self::checksum_path(&path)).await {
            Ok(expected) if expected.trim() != Self::checksum(&data) => {
                return Err(StoreError::ArtifactChecksum(location.to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Artifact {} has no checksum file", location);
            }
            Err(e) => return Err(e.into()),
        }

        String::from_utf8(data).map_err(|_| StoreError::ArtifactChecksum(location.to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_path).await?;
        fs::metadata(&self.base_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let id = Uuid::new_v4();

        let location = store
            .put(id, "return {}", PutMode::CreateNew)
            .await
            .unwrap();

        assert_eq!(location, format!("pipelines/{id}/pipeline.lua"));
        assert_eq!(store.get(&location).await.unwrap(), "return {}");
    }

    #[tokio::test]
    async fn test_create_new_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let id = Uuid::new_v4();

        store.put(id, "return 1", PutMode::CreateNew).await.unwrap();
        let err = store
            .put(id, "return 2", PutMode::CreateNew)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ArtifactExists(_)));

        let location = store.put(id, "return 2", PutMode::Replace).await.unwrap();
        assert_eq!(store.get(&location).await.unwrap(), "return 2");
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        let err = store
            .get(&artifact_key(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ArtifactMissing(_)));
    }

    #[tokio::test]
    async fn test_tampered_artifact_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let location = store
            .put(Uuid::new_v4(), "return {}", PutMode::CreateNew)
            .await
            .unwrap();

        std::fs::write(dir.path().join(&location), "os.execute('rm -rf /')").unwrap();

        let err = store.get(&location).await.unwrap_err();
        assert!(matches!(err, StoreError::ArtifactChecksum(_)));
    }

    #[tokio::test]
    async fn test_location_cannot_escape_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        let err = store.get("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StoreError::ArtifactMissing(_)));
    }
}
