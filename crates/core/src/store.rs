use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::backend::local::LocalBackend;
use crate::snapshot::Snapshot;

/// Persists the snapshot as one pretty-printed JSON document.
pub struct StateStore {
    backend: Arc<dyn Backend>,
    key: String,
}

impl StateStore {
    pub fn new(backend: Arc<dyn Backend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Store backed by a single local file.
    pub fn at_path(path: impl AsRef<Path>) -> Result<Self> {
        let (root, key) = split_path(path.as_ref())?;
        Ok(Self::new(Arc::new(LocalBackend::new(root)), key))
    }

    /// Load the stored snapshot. Missing or corrupt data is replaced by an
    /// empty snapshot, which is written immediately.
    pub async fn load(&self) -> Result<Snapshot> {
        if !self.backend.exists(&self.key).await? {
            info!(path = %self.key, "no stored state, starting empty");
            let empty = Snapshot::new();
            self.save(&empty).await?;
            return Ok(empty);
        }

        let data = self.backend.read(&self.key).await?;
        match Snapshot::from_bytes(&data) {
            Ok(snapshot) => {
                debug!(path = %self.key, entries = snapshot.len(), "state loaded");
                Ok(snapshot)
            }
            Err(err) => {
                warn!(path = %self.key, error = %err, "stored state is corrupt, resetting");
                let empty = Snapshot::new();
                self.save(&empty).await?;
                Ok(empty)
            }
        }
    }

    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let data = snapshot.to_bytes()?;
        self.backend
            .write(&self.key, &data)
            .await
            .with_context(|| format!("failed to save state to {}", self.key))
    }
}

/// Split a file path into the directory a `LocalBackend` is rooted at and
/// the file name inside it.
pub fn split_path(path: &Path) -> Result<(&Path, String)> {
    let name = path
        .file_name()
        .with_context(|| format!("not a file path: {}", path.display()))?
        .to_string_lossy()
        .into_owned();
    let root = path.parent().unwrap_or_else(|| Path::new(""));
    Ok((root, name))
}
