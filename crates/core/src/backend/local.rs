use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::Backend;

/// Files under a root directory. Writes go through a sibling temp file and a
/// rename, so a concurrent reader sees either the old or the new content.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root: path.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

fn temp_path(full: &Path) -> PathBuf {
    let name = full
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    full.with_file_name(format!(".{name}.tmp"))
}

#[async_trait]
impl Backend for LocalBackend {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("failed to read: {}", full.display()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path(&full);
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("failed to write: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &full)
            .await
            .with_context(|| format!("failed to replace: {}", full.display()))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        if full.is_file() {
            tokio::fs::remove_file(&full)
                .await
                .with_context(|| format!("failed to delete: {}", full.display()))?;
        }
        Ok(())
    }
}
