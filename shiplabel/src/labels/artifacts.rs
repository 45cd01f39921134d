//! Scratch storage for barcode images.
//!
//! Every label request writes exactly one artifact, keyed by its delivery identifier, reads it
//! back while composing the document and deletes it afterwards. Identifiers are unique per
//! request, so concurrent requests never touch the same entry and no locking is needed.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

#[derive(ThisError, Debug)]
pub enum ArtifactError {
    #[error("artifact {id} not found")]
    NotFound { id: String },

    #[error("'{id}' is not a valid artifact identifier")]
    InvalidId { id: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Storage capability for transient barcode images.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `id`, replacing any previous content.
    async fn write_artifact(&self, id: &str, bytes: &[u8]) -> Result<(), ArtifactError>;

    async fn read_artifact(&self, id: &str) -> Result<Bytes, ArtifactError>;

    /// Remove the artifact. Removing an artifact that does not exist succeeds.
    async fn delete_artifact(&self, id: &str) -> Result<(), ArtifactError>;

    /// Remove every artifact, returning how many entries were removed.
    async fn clear_all(&self) -> Result<usize, ArtifactError>;
}

/// Identifiers become file names, so only a conservative character set is accepted.
fn validate_id(id: &str) -> Result<(), ArtifactError> {
    let valid = !id.is_empty() && id.len() <= 128 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidId { id: id.to_string() })
    }
}

/// Artifacts stored as `<id>.png` files in a scratch directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, ArtifactError> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.png")))
    }

    fn io_error(path: &std::path::Path, source: std::io::Error) -> ArtifactError {
        ArtifactError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    async fn ensure_dir(&self) -> Result<(), ArtifactError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_error(&self.dir, e))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write_artifact(&self, id: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let path = self.path_for(id)?;
        self.ensure_dir().await?;
        tokio::fs::write(&path, bytes).await.map_err(|e| Self::io_error(&path, e))?;
        debug!(identifier = id, path = %path.display(), size = bytes.len(), "Wrote barcode artifact");
        Ok(())
    }

    async fn read_artifact(&self, id: &str) -> Result<Bytes, ArtifactError> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArtifactError::NotFound { id: id.to_string() }),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    async fn delete_artifact(&self, id: &str) -> Result<(), ArtifactError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    async fn clear_all(&self) -> Result<usize, ArtifactError> {
        self.ensure_dir().await?;

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| Self::io_error(&self.dir, e))?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::io_error(&self.dir, e))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| Self::io_error(&path, e))?;
            let result = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            result.map_err(|e| Self::io_error(&path, e))?;
            removed += 1;
        }

        info!(dir = %self.dir.display(), removed, "Cleared scratch directory");
        Ok(removed)
    }
}

/// Artifacts kept in memory. Used in tests and when no scratch directory is wanted.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: DashMap<String, Bytes>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.artifacts.contains_key(id)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn write_artifact(&self, id: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        validate_id(id)?;
        self.artifacts.insert(id.to_string(), Bytes::copy_from_slice(bytes));
        Ok(())
    }

    async fn read_artifact(&self, id: &str) -> Result<Bytes, ArtifactError> {
        self.artifacts
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ArtifactError::NotFound { id: id.to_string() })
    }

    async fn delete_artifact(&self, id: &str) -> Result<(), ArtifactError> {
        self.artifacts.remove(id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<usize, ArtifactError> {
        let removed = self.artifacts.len();
        self.artifacts.clear();
        Ok(removed)
    }
}

/// Deletes one artifact exactly once.
///
/// Call [`ArtifactGuard::release`] once the artifact is no longer needed. If the guard is dropped
/// without being released (the owning task was aborted or panicked), deletion is spawned onto the
/// current runtime instead. Deletion failures are logged and never propagated.
pub struct ArtifactGuard {
    store: Arc<dyn ArtifactStore>,
    id: String,
    armed: bool,
}

impl ArtifactGuard {
    pub fn new(store: Arc<dyn ArtifactStore>, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
            armed: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Delete the artifact now.
    pub async fn release(mut self) {
        // Stays armed until the delete has run, so a cancelled release still cleans up on drop
        delete_logged(self.store.as_ref(), &self.id).await;
        self.armed = false;
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let store = self.store.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { delete_logged(store.as_ref(), &id).await });
            }
            Err(_) => {
                warn!(identifier = %id, stage = "cleanup", "No runtime available to delete barcode artifact");
            }
        }
    }
}

async fn delete_logged(store: &dyn ArtifactStore, id: &str) {
    match store.delete_artifact(id).await {
        Ok(()) => debug!(identifier = id, stage = "cleanup", "Deleted barcode artifact"),
        Err(e) => warn!(identifier = id, stage = "cleanup", error = %e, "Failed to delete barcode artifact"),
    }
}
