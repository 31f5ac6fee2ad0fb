use anyhow::Result;
use async_trait::async_trait;

use crate::snapshot::Records;

/// Where current metadata for tracked ids comes from.
///
/// Ids that could not be fetched are absent from the result; an `Err` means
/// the whole fetch failed.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, ids: &[String]) -> Result<Records>;
}
