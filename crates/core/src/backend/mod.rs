pub mod local;

use anyhow::Result;
use async_trait::async_trait;

/// Durable storage for whole-file state records.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    /// Replace the content at `path`; readers never see a partial write.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn delete(&self, path: &str) -> Result<()>;
}
