use crate::error::{FleetError, Result};
use crate::store::PortFuture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Where captured agent output ends up. Returned references are stored on
/// the operation record.
pub trait ArtifactStore: Send + Sync {
    fn put<'a>(
        &'a self,
        operation_id: &'a str,
        name: &'a str,
        bytes: Vec<u8>,
    ) -> PortFuture<'a, String>;

    fn get<'a>(&'a self, reference: &'a str) -> PortFuture<'a, Option<Vec<u8>>>;
}

/// Reference `put` returns for this pair, computed without storing anything.
///
/// # Errors
/// `Validation` when either part is not a plain path segment.
pub fn artifact_ref(operation_id: &str, name: &str) -> Result<String> {
    let plain = |part: &str| {
        !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
    };
    if plain(operation_id) && plain(name) {
        Ok(format!("{operation_id}/{name}"))
    } else {
        Err(FleetError::Validation(format!(
            "invalid artifact name: {operation_id}/{name}"
        )))
    }
}

/// Files under `<root>/<operation_id>/<name>`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put<'a>(
        &'a self,
        operation_id: &'a str,
        name: &'a str,
        bytes: Vec<u8>,
    ) -> PortFuture<'a, String> {
        Box::pin(async move {
            let reference = artifact_ref(operation_id, name)?;
            let dir = self.root.join(operation_id);
            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(name);
            tokio::fs::write(&path, &bytes).await?;
            debug!(path = %path.display(), size = bytes.len(), "Stored artifact");
            Ok(reference)
        })
    }

    fn get<'a>(&'a self, reference: &'a str) -> PortFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let Some((operation_id, name)) = reference.split_once('/') else {
                return Ok(None);
            };
            artifact_ref(operation_id, name)?;
            match tokio::fs::read(self.root.join(operation_id).join(name)).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(FleetError::Io(e)),
            }
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put<'a>(
        &'a self,
        operation_id: &'a str,
        name: &'a str,
        bytes: Vec<u8>,
    ) -> PortFuture<'a, String> {
        Box::pin(async move {
            let reference = artifact_ref(operation_id, name)?;
            self.blobs.write().await.insert(reference.clone(), bytes);
            Ok(reference)
        })
    }

    fn get<'a>(&'a self, reference: &'a str) -> PortFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move { Ok(self.blobs.read().await.get(reference).cloned()) })
    }
}
